/**
 * User Database Operations
 *
 * User rows come from the identity provider: the auth endpoint upserts
 * one row per Google identity and records a login row per successful
 * exchange.
 */
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// One user row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        google_id: row.get("google_id"),
        email: row.get("email"),
        name: row.get("name"),
        avatar_url: row.get("avatar_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Insert or refresh the user row for a Google identity.
///
/// Matching is on `google_id`; email, name and avatar are refreshed on
/// every login since the provider may have newer values.
pub async fn upsert_google_user(
    pool: &PgPool,
    google_id: &str,
    email: &str,
    name: &str,
    avatar_url: Option<&str>,
) -> Result<User, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO users (id, google_id, email, name, avatar_url, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        ON CONFLICT (google_id) DO UPDATE
        SET email = EXCLUDED.email,
            name = EXCLUDED.name,
            avatar_url = EXCLUDED.avatar_url,
            updated_at = EXCLUDED.updated_at
        RETURNING id, google_id, email, name, avatar_url, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(google_id)
    .bind(email)
    .bind(name)
    .bind(avatar_url)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row_to_user(&row))
}

/// Look up a user by id.
pub async fn get_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, google_id, email, name, avatar_url, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_user))
}

/// Record one successful login.
pub async fn record_login(
    pool: &PgPool,
    user_id: Uuid,
    platform: Option<&str>,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO login_records (id, user_id, platform, ip, user_agent, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(platform)
    .bind(ip)
    .bind(user_agent)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
