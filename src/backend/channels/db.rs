/**
 * Channel Database Operations
 *
 * Channels and memberships live only in the durable store; the registry
 * tracks which members are currently connected, not who belongs.
 */
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// One channel row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_channel(row: &sqlx::postgres::PgRow) -> Channel {
    Channel {
        id: row.get("id"),
        name: row.get("name"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Create a channel and enroll its creator as the first member.
pub async fn create_channel(
    pool: &PgPool,
    name: &str,
    created_by: Uuid,
) -> Result<Channel, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO channels (id, name, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(created_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO channel_members (channel_id, user_id, joined_at) VALUES ($1, $2, $3)",
    )
    .bind(id)
    .bind(created_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Channel {
        id,
        name: name.to_string(),
        created_by,
        created_at: now,
        updated_at: now,
    })
}

/// Look up a channel by id.
pub async fn get_channel(pool: &PgPool, id: Uuid) -> Result<Option<Channel>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, name, created_by, created_at, updated_at FROM channels WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_channel))
}

/// Look up a channel by its unique name.
pub async fn get_channel_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<Channel>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, name, created_by, created_at, updated_at FROM channels WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_channel))
}

/// Add a user to a channel. Joining twice is a no-op.
pub async fn join_channel(pool: &PgPool, channel_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO channel_members (channel_id, user_id, joined_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (channel_id, user_id) DO NOTHING
        "#,
    )
    .bind(channel_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a user from a channel. Returns whether a membership existed.
pub async fn quit_channel(
    pool: &PgPool,
    channel_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM channel_members WHERE channel_id = $1 AND user_id = $2")
        .bind(channel_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// All channels the user belongs to.
pub async fn list_channels_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<Channel>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.name, c.created_by, c.created_at, c.updated_at
        FROM channels c
        INNER JOIN channel_members m ON c.id = m.channel_id
        WHERE m.user_id = $1
        ORDER BY c.name ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_channel).collect())
}

/// Whether the user belongs to the channel.
pub async fn is_member(pool: &PgPool, channel_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM channel_members WHERE channel_id = $1 AND user_id = $2",
    )
    .bind(channel_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}
