/**
 * Socket Event Dispatch
 *
 * One inbound envelope enters here per read-loop iteration and is routed
 * into its typed handler. Handlers return `Result<Option<Envelope>,
 * BackendError>`: a reply envelope for the originator, nothing when the
 * answer travels as a room broadcast, or a failure the conversion layer
 * turns into `systemmessage`/`error`. Edit events have their own mapping
 * because `editRejected` is a first-class protocol message, not an error.
 */
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::channels::db as channels;
use crate::backend::docs::dispatcher::{AppliedEdit, EditError};
use crate::backend::docs::record::DocStatus;
use crate::backend::docs::{materialize, store, MaterializeError};
use crate::backend::error::BackendError;
use crate::backend::server::state::AppState;
use crate::backend::ws::types::*;
use crate::shared::envelope::{client_event, server_event};
use crate::shared::Envelope;

/// Route one inbound envelope and queue whatever answer it produces.
pub async fn handle_event(state: &AppState, session_id: Uuid, user_id: Uuid, envelope: Envelope) {
    let event = envelope.event.clone();
    let outcome = route(state, session_id, user_id, &envelope).await;

    let reply = match outcome {
        Ok(reply) => reply,
        Err(err) => {
            if matches!(
                err,
                BackendError::Database(_) | BackendError::TransientExternal { .. }
            ) {
                tracing::warn!("[Events] {} failed for {}: {}", event, user_id, err);
            }
            Some(err.into_envelope(&event))
        }
    };
    if let Some(reply) = reply {
        state.registry.send_to(session_id, reply);
    }
}

async fn route(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    envelope: &Envelope,
) -> Result<Option<Envelope>, BackendError> {
    match envelope.event.as_str() {
        client_event::PING => Ok(Some(Envelope::server(
            server_event::PONG,
            serde_json::json!({}),
        ))),

        client_event::CREATE_CHANNEL => {
            let data: CreateChannelData = parse(envelope)?;
            create_channel(state, user_id, data).await
        }
        client_event::JOIN_CHANNEL => {
            let data: ChannelIdData = parse(envelope)?;
            join_channel(state, user_id, data).await
        }
        client_event::LIST_CHANNEL => list_channels(state, user_id).await,
        client_event::QUIT_CHANNEL => {
            let data: ChannelIdData = parse(envelope)?;
            quit_channel(state, session_id, user_id, data).await
        }
        client_event::ENTER_CHANNEL => {
            let data: ChannelIdData = parse(envelope)?;
            enter_channel(state, session_id, user_id, data).await
        }
        client_event::LEAVE_CHANNEL => leave_channel(state, session_id, user_id).await,

        client_event::CREATE_DOC => {
            let data: CreateDocData = parse(envelope)?;
            create_doc(state, session_id, user_id, data).await
        }
        client_event::DELETE_DOC => {
            let data: DocIdData = parse(envelope)?;
            delete_doc(state, session_id, user_id, data).await
        }
        client_event::LIST_DOC => {
            let data: ListDocData = parse(envelope)?;
            list_docs(state, session_id, user_id, data).await
        }
        client_event::UPDATE_DOC => {
            let data: UpdateDocData = parse(envelope)?;
            update_doc(state, session_id, user_id, data).await
        }
        client_event::ENTER_DOC => {
            let data: DocIdData = parse(envelope)?;
            enter_doc(state, session_id, user_id, data).await
        }
        client_event::LEAVE_DOC => leave_doc(state, session_id, user_id).await,

        client_event::EDIT_DOC => {
            let data: EditDocData = parse(envelope)?;
            let result = state
                .dispatcher
                .edit_doc(session_id, data.doc_id, data.intent)
                .await;
            Ok(edit_outcome(data.doc_id, result))
        }
        client_event::EDIT_DOC_BATCH => {
            let data: EditDocBatchData = parse(envelope)?;
            let result = state
                .dispatcher
                .edit_doc_batch(session_id, data.doc_id, data.edit)
                .await;
            Ok(edit_outcome(data.doc_id, result))
        }

        client_event::SYNC_DOC => {
            let data: DocIdData = parse(envelope)?;
            let record = state.lifecycle.sync_doc(data.doc_id, user_id).await?;
            Ok(Some(Envelope::server(
                server_event::DOC_SYNCED,
                serde_json::json!({ "docId": data.doc_id, "version": record.version }),
            )))
        }
        client_event::SNAPSHOT_DOC => {
            let data: DocIdData = parse(envelope)?;
            let record = state.lifecycle.snapshot_doc(data.doc_id, user_id).await?;
            Ok(Some(Envelope::server(
                server_event::SNAPSHOT_CREATED,
                serde_json::json!({
                    "docId": data.doc_id,
                    "version": record.version,
                    "content": record.content,
                }),
            )))
        }

        client_event::GET_CHANNEL_USERS => {
            let data: GetChannelUsersData = parse(envelope)?;
            get_channel_users(state, session_id, data)
        }
        client_event::GET_DOC_USERS => {
            let data: DocIdData = parse(envelope)?;
            Ok(Some(Envelope::server(
                server_event::DOC_USERS,
                serde_json::json!({
                    "docId": data.doc_id,
                    "users": state.registry.doc_users(data.doc_id),
                }),
            )))
        }
        client_event::GET_DOC_STATUS => {
            let data: DocIdData = parse(envelope)?;
            get_doc_status(state, data).await
        }

        unknown => Err(BackendError::protocol(format!("unknown event '{unknown}'"))),
    }
}

fn parse<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, BackendError> {
    serde_json::from_value(envelope.data.clone())
        .map_err(|e| BackendError::protocol(format!("invalid {} payload: {e}", envelope.event)))
}

fn pool(state: &AppState) -> Result<&PgPool, BackendError> {
    state
        .db_pool
        .as_ref()
        .ok_or_else(|| BackendError::transient("durable store", "not configured"))
}

async fn require_member(
    pool: &PgPool,
    channel_id: Uuid,
    user_id: Uuid,
) -> Result<(), BackendError> {
    if channels::is_member(pool, channel_id, user_id).await? {
        Ok(())
    } else {
        Err(BackendError::authorization(
            "you are not a member of this channel",
        ))
    }
}

fn current_channel(state: &AppState, session_id: Uuid) -> Result<Uuid, BackendError> {
    state
        .registry
        .snapshot(session_id)
        .and_then(|s| s.current_channel)
        .ok_or_else(|| BackendError::validation("channelId", "enter a channel first"))
}

/// Map a dispatcher outcome onto the protocol: success is carried by the
/// room broadcast (the originator is a room member), an already-deleted
/// delete gets a direct acknowledgement, and a non-NORMAL document gets
/// the first-class `editRejected` answer.
fn edit_outcome(doc_id: Uuid, result: Result<AppliedEdit, EditError>) -> Option<Envelope> {
    match result {
        Ok(applied) if applied.already_deleted => Some(Envelope::server(
            server_event::DOC_OP,
            serde_json::json!({ "docId": doc_id, "alreadyDeleted": true }),
        )),
        Ok(_) => None,
        Err(EditError::Rejected { status, reason }) => Some(Envelope::server(
            server_event::EDIT_REJECTED,
            serde_json::json!({
                "docId": doc_id,
                "status": status,
                "reason": reason.unwrap_or_else(|| "document is not editable".to_string()),
            }),
        )),
        Err(EditError::NotViewing) => {
            Some(Envelope::system_message("enter the document before editing"))
        }
        Err(EditError::NotFound) => Some(Envelope::system_message("document not found")),
        Err(EditError::Unavailable) => Some(Envelope::system_message(
            "document is unavailable, please retry shortly",
        )),
        Err(EditError::Validation(shared)) => Some(Envelope::system_message(shared.to_string())),
        Err(EditError::Stale(message)) => Some(Envelope::system_message(message)),
    }
}

async fn create_channel(
    state: &AppState,
    user_id: Uuid,
    data: CreateChannelData,
) -> Result<Option<Envelope>, BackendError> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(BackendError::validation("name", "channel name is required"));
    }
    let channel = channels::create_channel(pool(state)?, name, user_id).await?;
    tracing::info!("[Events] channel '{}' created by {}", channel.name, user_id);
    Ok(Some(Envelope::server(
        server_event::CHANNEL_CREATED,
        serde_json::json!({ "channel": channel }),
    )))
}

async fn join_channel(
    state: &AppState,
    user_id: Uuid,
    data: ChannelIdData,
) -> Result<Option<Envelope>, BackendError> {
    let pool = pool(state)?;
    let channel = channels::get_channel(pool, data.channel_id)
        .await?
        .ok_or_else(|| BackendError::not_found("channel"))?;
    channels::join_channel(pool, channel.id, user_id).await?;
    Ok(Some(Envelope::server(
        server_event::CHANNEL_JOINED,
        serde_json::json!({ "channel": channel }),
    )))
}

async fn list_channels(state: &AppState, user_id: Uuid) -> Result<Option<Envelope>, BackendError> {
    let list = channels::list_channels_for_user(pool(state)?, user_id).await?;
    Ok(Some(Envelope::server(
        server_event::CHANNEL_LIST,
        serde_json::json!({ "channels": list }),
    )))
}

async fn quit_channel(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: ChannelIdData,
) -> Result<Option<Envelope>, BackendError> {
    let existed = channels::quit_channel(pool(state)?, data.channel_id, user_id).await?;
    if !existed {
        return Err(BackendError::not_found("membership"));
    }
    // Quitting the channel you are standing in also walks you out of it.
    let snapshot = state.registry.snapshot(session_id);
    if snapshot.and_then(|s| s.current_channel) == Some(data.channel_id) {
        leave_rooms(state, session_id, user_id).await;
    }
    Ok(Some(Envelope::server(
        server_event::CHANNEL_QUIT,
        serde_json::json!({ "channelId": data.channel_id }),
    )))
}

async fn enter_channel(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: ChannelIdData,
) -> Result<Option<Envelope>, BackendError> {
    let pool = pool(state)?;
    let channel = channels::get_channel(pool, data.channel_id)
        .await?
        .ok_or_else(|| BackendError::not_found("channel"))?;
    require_member(pool, channel.id, user_id).await?;

    // Standing in at most one channel per socket: leave the old room and
    // its broadcasts first.
    leave_rooms(state, session_id, user_id).await;
    state.registry.attach_channel(session_id, channel.id);

    let entered = Envelope::server(
        server_event::USER_ENTERED,
        serde_json::json!({ "channelId": channel.id, "userId": user_id }),
    );
    state
        .registry
        .broadcast_to_channel(channel.id, &entered, Some(session_id));

    Ok(Some(Envelope::server(
        server_event::CHANNEL_ENTERED,
        serde_json::json!({
            "channel": channel,
            "users": state.registry.channel_users(channel.id),
        }),
    )))
}

async fn leave_channel(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Envelope>, BackendError> {
    let left = leave_rooms(state, session_id, user_id).await;
    Ok(Some(Envelope::server(
        server_event::CHANNEL_LEFT,
        serde_json::json!({ "channelId": left }),
    )))
}

/// Detach from the current doc (if any) and the current channel (if any),
/// emitting the matching leave broadcasts and running last-viewer
/// handling. Returns the channel left.
pub async fn leave_rooms(state: &AppState, session_id: Uuid, user_id: Uuid) -> Option<Uuid> {
    let snapshot = state.registry.snapshot(session_id)?;
    if snapshot.current_doc.is_some() {
        let _ = leave_doc_room(state, session_id, user_id).await;
    }
    let channel_id = state.registry.detach_channel(session_id)?;
    let envelope = Envelope::server(
        server_event::USER_LEFT,
        serde_json::json!({ "channelId": channel_id, "userId": user_id }),
    );
    state
        .registry
        .broadcast_to_channel(channel_id, &envelope, Some(session_id));
    Some(channel_id)
}

/// Detach from the current doc room with its broadcasts and last-viewer
/// write-through. Returns the doc left.
pub async fn leave_doc_room(state: &AppState, session_id: Uuid, user_id: Uuid) -> Option<Uuid> {
    let snapshot = state.registry.snapshot(session_id)?;
    let channel_id = snapshot.current_channel;
    let doc_id = state.registry.detach_doc(session_id)?;

    let left = Envelope::server(
        server_event::USER_LEFT_DOC,
        serde_json::json!({ "docId": doc_id, "userId": user_id }),
    );
    state.registry.broadcast_to_doc(doc_id, &left, Some(session_id));
    if let Some(channel_id) = channel_id {
        let presence = Envelope::server(
            server_event::USER_DOC_STATUS_CHANGED,
            serde_json::json!({ "userId": user_id, "docId": null, "leftDocId": doc_id }),
        );
        state
            .registry
            .broadcast_to_channel(channel_id, &presence, Some(session_id));
    }

    state.lifecycle.on_last_viewer_leave(doc_id).await;
    Some(doc_id)
}

async fn create_doc(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: CreateDocData,
) -> Result<Option<Envelope>, BackendError> {
    let pool = pool(state)?;
    let channel_id = match data.channel_id {
        Some(id) => id,
        None => current_channel(state, session_id)?,
    };
    require_member(pool, channel_id, user_id).await?;
    let name = data.name.trim();
    if name.is_empty() {
        return Err(BackendError::validation("name", "document name is required"));
    }

    let record = store::create_doc(
        pool,
        channel_id,
        data.parent_id,
        name,
        data.is_directory,
        user_id,
        state.config.service_version,
    )
    .await?;

    let changed = Envelope::server(
        server_event::DOC_LIST_CHANGED,
        serde_json::json!({ "channelId": channel_id }),
    );
    state
        .registry
        .broadcast_to_channel(channel_id, &changed, Some(session_id));

    Ok(Some(Envelope::server(
        server_event::DOC_CREATED,
        serde_json::json!({ "doc": record.summary() }),
    )))
}

async fn delete_doc(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: DocIdData,
) -> Result<Option<Envelope>, BackendError> {
    let pool = pool(state)?;
    let record = store::load_doc(pool, data.doc_id)
        .await?
        .filter(|r| r.status != DocStatus::Deleted)
        .ok_or_else(|| BackendError::not_found("document"))?;
    require_member(pool, record.channel_id, user_id).await?;

    store::soft_delete(pool, data.doc_id).await?;
    state.cache.delete(data.doc_id).await;
    state.lanes.remove(data.doc_id);

    // Viewers are walked out of the dead room after being told.
    let deleted = Envelope::server(
        server_event::DOC_DELETED,
        serde_json::json!({ "docId": data.doc_id }),
    );
    state.registry.broadcast_to_doc(data.doc_id, &deleted, None);
    for viewer in state.registry.sessions_in_doc(data.doc_id) {
        state.registry.detach_doc(viewer);
    }
    state
        .registry
        .broadcast_to_channel(record.channel_id, &deleted, Some(session_id));
    let changed = Envelope::server(
        server_event::DOC_LIST_CHANGED,
        serde_json::json!({ "channelId": record.channel_id }),
    );
    state
        .registry
        .broadcast_to_channel(record.channel_id, &changed, Some(session_id));

    Ok(Some(Envelope::server(
        server_event::DOC_DELETED,
        serde_json::json!({ "docId": data.doc_id }),
    )))
}

async fn list_docs(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: ListDocData,
) -> Result<Option<Envelope>, BackendError> {
    let pool = pool(state)?;
    let channel_id = match data.channel_id {
        Some(id) => id,
        None => current_channel(state, session_id)?,
    };
    require_member(pool, channel_id, user_id).await?;
    let docs = store::list_docs(pool, channel_id).await?;
    let summaries: Vec<_> = docs.iter().map(|d| d.summary()).collect();
    Ok(Some(Envelope::server(
        server_event::DOC_LIST,
        serde_json::json!({ "channelId": channel_id, "docs": summaries }),
    )))
}

async fn update_doc(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: UpdateDocData,
) -> Result<Option<Envelope>, BackendError> {
    let pool = pool(state)?;
    if data.name.is_none() && data.parent_id.is_none() {
        return Err(BackendError::validation(
            "updateDoc",
            "nothing to update: pass name and/or parentId",
        ));
    }
    let existing = store::load_doc(pool, data.doc_id)
        .await?
        .filter(|r| r.status != DocStatus::Deleted)
        .ok_or_else(|| BackendError::not_found("document"))?;
    require_member(pool, existing.channel_id, user_id).await?;

    let updated = store::rename_move(pool, data.doc_id, data.name.as_deref(), data.parent_id)
        .await?
        .ok_or_else(|| BackendError::not_found("document"))?;

    // The cached copy carries path metadata too; refresh it in place
    // without touching content state.
    {
        let lane = state.lanes.lane(data.doc_id);
        let _guard = lane.lock().await;
        state
            .cache
            .update(data.doc_id, |cached| {
                cached.name = updated.name.clone();
                cached.parent_id = updated.parent_id;
                cached.updated_at = updated.updated_at;
            })
            .await;
    }

    // The channel hears the tree change; open viewers hear the metadata
    // change on the doc itself.
    let broadcast = Envelope::server(
        server_event::DOC_UPDATED,
        serde_json::json!({ "doc": updated.summary() }),
    );
    state
        .registry
        .broadcast_to_channel(updated.channel_id, &broadcast, Some(session_id));
    let info = Envelope::server(
        server_event::DOC_INFO_CHANGED,
        serde_json::json!({ "doc": updated.summary() }),
    );
    state
        .registry
        .broadcast_to_doc(updated.id, &info, Some(session_id));

    Ok(Some(Envelope::server(
        server_event::DOC_UPDATED,
        serde_json::json!({ "doc": updated.summary() }),
    )))
}

async fn enter_doc(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    data: DocIdData,
) -> Result<Option<Envelope>, BackendError> {
    let channel_id = current_channel(state, session_id)?;
    let record = materialize(&state.cache, state.db_pool.as_ref(), data.doc_id)
        .await
        .map_err(|err| match err {
            MaterializeError::NotFound => BackendError::not_found("document"),
            MaterializeError::Unavailable => {
                BackendError::transient("hot tier", "document cannot be materialized")
            }
            MaterializeError::Database(e) => BackendError::Database(e),
        })?;
    if record.channel_id != channel_id {
        return Err(BackendError::authorization(
            "document belongs to another channel",
        ));
    }
    if record.is_directory {
        return Err(BackendError::validation("docId", "cannot enter a directory"));
    }

    // Leaving any previous doc first keeps the doc index consistent with
    // the session field.
    if state
        .registry
        .snapshot(session_id)
        .and_then(|s| s.current_doc)
        .is_some()
    {
        leave_doc_room(state, session_id, user_id).await;
    }
    state.registry.attach_doc(session_id, data.doc_id);

    let entered = Envelope::server(
        server_event::USER_ENTERED_DOC,
        serde_json::json!({ "docId": data.doc_id, "userId": user_id }),
    );
    state
        .registry
        .broadcast_to_doc(data.doc_id, &entered, Some(session_id));
    let presence = Envelope::server(
        server_event::USER_DOC_STATUS_CHANGED,
        serde_json::json!({ "userId": user_id, "docId": data.doc_id }),
    );
    state
        .registry
        .broadcast_to_channel(channel_id, &presence, Some(session_id));

    Ok(Some(Envelope::server(
        server_event::DOC_ENTERED,
        serde_json::json!({
            "doc": {
                "id": record.id,
                "channelId": record.channel_id,
                "name": record.name,
                "status": record.status,
                "version": record.version,
                "content": record.content,
                "chunks": record.chunks,
            },
            "users": state.registry.doc_users(data.doc_id),
        }),
    )))
}

async fn leave_doc(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Envelope>, BackendError> {
    let doc_id = leave_doc_room(state, session_id, user_id).await;
    Ok(Some(Envelope::server(
        server_event::DOC_LEFT,
        serde_json::json!({ "docId": doc_id }),
    )))
}

fn get_channel_users(
    state: &AppState,
    session_id: Uuid,
    data: GetChannelUsersData,
) -> Result<Option<Envelope>, BackendError> {
    let channel_id = match data.channel_id {
        Some(id) => id,
        None => current_channel(state, session_id)?,
    };
    Ok(Some(Envelope::server(
        server_event::CHANNEL_USERS,
        serde_json::json!({
            "channelId": channel_id,
            "users": state.registry.channel_users(channel_id),
        }),
    )))
}

async fn get_doc_status(
    state: &AppState,
    data: DocIdData,
) -> Result<Option<Envelope>, BackendError> {
    let record = materialize(&state.cache, state.db_pool.as_ref(), data.doc_id)
        .await
        .map_err(|err| match err {
            MaterializeError::NotFound => BackendError::not_found("document"),
            MaterializeError::Unavailable => {
                BackendError::transient("hot tier", "document cannot be materialized")
            }
            MaterializeError::Database(e) => BackendError::Database(e),
        })?;
    Ok(Some(Envelope::server(
        server_event::DOC_STATUS,
        serde_json::json!({
            "docId": record.id,
            "status": record.status,
            "version": record.version,
            "viewers": state.registry.doc_user_count(record.id),
        }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::docs::record::DocRecord;
    use crate::backend::registry::OUTBOUND_QUEUE_CAPACITY;
    use crate::backend::server::config::ServerConfig;
    use crate::shared::crdt::{Chunk, ChunkList, LseqId, Version};
    use chrono::Utc;
    use tokio::sync::{mpsc, watch};

    fn test_config() -> ServerConfig {
        ServerConfig {
            service_version: 1,
            database_url: None,
            hot_tier_url: None,
            token_secret: "test".to_string(),
            listen_port: 0,
            google_client_id: None,
            google_client_secret: None,
        }
    }

    async fn seeded_state() -> (AppState, Uuid, Uuid) {
        let state = AppState::for_tests(test_config());
        let channel_id = Uuid::new_v4();
        let doc_id = Uuid::new_v4();
        let chunks = ChunkList::from_chunks(vec![Chunk {
            id: LseqId::from_components(vec![10]).unwrap(),
            text: "hello".to_string(),
        }]);
        let record = DocRecord {
            id: doc_id,
            channel_id,
            parent_id: None,
            name: "doc.txt".to_string(),
            is_directory: false,
            status: DocStatus::Normal,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: Version::initial(1),
            content: chunks.content(),
            chunks,
            op_log: Vec::new(),
            last_snapshot_at: None,
            lock_reason: None,
            dirty: false,
        };
        state.cache.put(&record).await;
        (state, channel_id, doc_id)
    }

    fn connect(state: &AppState) -> (Uuid, Uuid, mpsc::Receiver<Envelope>) {
        let user_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (close_tx, _close_rx) = watch::channel(None);
        let session_id = state.registry.register(user_id, tx, close_tx);
        (session_id, user_id, rx)
    }

    fn request(event: &str, data: serde_json::Value) -> Envelope {
        Envelope {
            event: event.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (state, _, _) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        handle_event(&state, session, user, request("ping", serde_json::json!({}))).await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "pong");
        assert!(reply.data["time"].is_i64());
    }

    #[tokio::test]
    async fn test_unknown_event_answers_error_envelope() {
        let (state, _, _) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        handle_event(
            &state,
            session,
            user,
            request("bogusEvent", serde_json::json!({})),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "error");
        assert_eq!(reply.data["originalEvent"], "bogusEvent");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_protocol_error() {
        let (state, _, _) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        handle_event(
            &state,
            session,
            user,
            request("enterDoc", serde_json::json!({ "docId": "not-a-uuid" })),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "error");
    }

    #[tokio::test]
    async fn test_channel_ops_without_store_degrade() {
        let (state, _, _) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        handle_event(
            &state,
            session,
            user,
            request("createChannel", serde_json::json!({ "name": "general" })),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "systemmessage");
        assert!(reply.data["message"]
            .as_str()
            .unwrap()
            .contains("durable store"));
    }

    #[tokio::test]
    async fn test_edit_flow_over_events() {
        let (state, channel_id, doc_id) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        state.registry.attach_channel(session, channel_id);
        state.registry.attach_doc(session, doc_id);

        handle_event(
            &state,
            session,
            user,
            request(
                "editDocBatch",
                serde_json::json!({
                    "docId": doc_id,
                    "targetId": "00010",
                    "offset": 3,
                    "text": "Z",
                }),
            ),
        )
        .await;

        let broadcast = rx.try_recv().unwrap();
        assert_eq!(broadcast.event, "docOpBatch");
        let record = state.cache.get(doc_id).await.unwrap();
        assert_eq!(record.content, "helZlo");
    }

    #[tokio::test]
    async fn test_edit_without_entering_doc() {
        let (state, channel_id, doc_id) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        state.registry.attach_channel(session, channel_id);

        handle_event(
            &state,
            session,
            user,
            request(
                "editDoc",
                serde_json::json!({
                    "docId": doc_id,
                    "intent": "delete",
                    "id": "00010",
                }),
            ),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "systemmessage");
    }

    #[tokio::test]
    async fn test_locked_doc_edit_answers_edit_rejected() {
        let (state, channel_id, doc_id) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        state.registry.attach_channel(session, channel_id);
        state.registry.attach_doc(session, doc_id);

        let mut record = state.cache.get(doc_id).await.unwrap();
        record.status = DocStatus::Locked;
        record.lock_reason = Some("sync in progress".to_string());
        state.cache.put(&record).await;

        handle_event(
            &state,
            session,
            user,
            request(
                "editDoc",
                serde_json::json!({
                    "docId": doc_id,
                    "intent": "delete",
                    "id": "00010",
                }),
            ),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "editRejected");
        assert_eq!(reply.data["reason"], "sync in progress");
    }

    #[tokio::test]
    async fn test_duplicate_delete_acknowledged_already_deleted() {
        let (state, channel_id, doc_id) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        state.registry.attach_channel(session, channel_id);
        state.registry.attach_doc(session, doc_id);

        let delete = serde_json::json!({
            "docId": doc_id,
            "intent": "delete",
            "id": "00010",
        });
        handle_event(&state, session, user, request("editDoc", delete.clone())).await;
        assert_eq!(rx.try_recv().unwrap().event, "docOp");

        handle_event(&state, session, user, request("editDoc", delete)).await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "docOp");
        assert_eq!(reply.data["alreadyDeleted"], true);
    }

    #[tokio::test]
    async fn test_get_doc_status_and_users() {
        let (state, channel_id, doc_id) = seeded_state().await;
        let (session, user, mut rx) = connect(&state);
        state.registry.attach_channel(session, channel_id);
        state.registry.attach_doc(session, doc_id);

        handle_event(
            &state,
            session,
            user,
            request("getDocStatus", serde_json::json!({ "docId": doc_id })),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "docStatus");
        assert_eq!(reply.data["viewers"], 1);

        handle_event(
            &state,
            session,
            user,
            request("getDocUsers", serde_json::json!({ "docId": doc_id })),
        )
        .await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "docUsers");
        assert_eq!(reply.data["users"][0], serde_json::json!(user));
    }

    #[tokio::test]
    async fn test_leave_doc_announces_to_remaining_viewer() {
        let (state, channel_id, doc_id) = seeded_state().await;
        let (leaver, leaver_user, mut rx_leaver) = connect(&state);
        let (stayer, _, mut rx_stayer) = connect(&state);
        for s in [leaver, stayer] {
            state.registry.attach_channel(s, channel_id);
            state.registry.attach_doc(s, doc_id);
        }

        handle_event(
            &state,
            leaver,
            leaver_user,
            request("leaveDoc", serde_json::json!({})),
        )
        .await;

        assert_eq!(rx_leaver.try_recv().unwrap().event, "docLeft");
        let seen: Vec<String> = std::iter::from_fn(|| rx_stayer.try_recv().ok())
            .map(|e| e.event)
            .collect();
        assert!(seen.contains(&"userLeftDoc".to_string()));
        assert!(seen.contains(&"userDocStatusChanged".to_string()));
        assert_eq!(state.registry.doc_user_count(doc_id), 1);
    }
}
