/**
 * Socket Connection Handling
 *
 * One persistent bidirectional connection per client at `GET /ws`,
 * authenticated by `?token=<bearer>` before any event flows. Each
 * connection runs as one read task dispatching into typed handlers plus
 * one writer task draining the session's bounded outbound queue; the
 * out-of-band close signal lets the server shed a session whose queue is
 * already full.
 *
 * Close codes: 1008 auth failure, 1001 server shutdown, 1011 unexpected
 * server error.
 */
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::backend::auth::sessions::user_id_from_token;
use crate::backend::registry::{
    CLOSE_POLICY_VIOLATION, CLOSE_SERVER_ERROR, OUTBOUND_QUEUE_CAPACITY,
};
use crate::backend::server::state::AppState;
use crate::backend::ws::events;
use crate::shared::Envelope;

/// Per-event processing deadline; an event that exceeds it answers an
/// `error` envelope without aborting the connection.
const EVENT_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Upgrade handler for `GET /ws?token=<bearer>`.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = match query.token.as_deref() {
        Some(token) => user_id_from_token(&state.config.token_secret, token)
            .map_err(|e| {
                tracing::warn!("[WS] rejected connection: {}", e);
                e
            })
            .ok(),
        None => {
            tracing::warn!("[WS] rejected connection: missing token");
            None
        }
    };
    ws.on_upgrade(move |socket| handle_socket(state, socket, auth))
}

async fn handle_socket(state: AppState, socket: WebSocket, auth: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();

    // The upgrade always completes so the failure can travel as a proper
    // close status instead of a dropped TCP stream.
    let Some(user_id) = auth else {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: "authentication failed".into(),
            })))
            .await;
        return;
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(OUTBOUND_QUEUE_CAPACITY);
    let (close_tx, close_rx) = watch::channel(None::<u16>);
    let session_id = state.registry.register(user_id, outbound_tx, close_tx);
    tracing::info!("[WS] session {} opened for user {}", session_id, user_id);

    // Writer: single owner of the sink, serving the bounded queue. The
    // close signal takes priority over queued frames.
    let mut writer_close = close_rx.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                changed = writer_close.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let code = writer_close.borrow().unwrap_or(CLOSE_SERVER_ERROR);
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: "".into(),
                        })))
                        .await;
                    break;
                }
                item = outbound_rx.recv() => {
                    match item {
                        Some(envelope) => {
                            if sender
                                .send(Message::Text(envelope.encode().into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        // Queue dropped: the session was unregistered.
                        None => {
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
        }
    });

    // Reader: one logical task per connection, dispatching into handlers.
    let mut reader_close = close_rx;
    loop {
        tokio::select! {
            changed = reader_close.changed() => {
                if changed.is_ok() {
                    tracing::info!(
                        "[WS] session {} closed by server ({:?})",
                        session_id,
                        *reader_close.borrow()
                    );
                }
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match Envelope::decode(&text) {
                            Ok(envelope) => {
                                let event = envelope.event.clone();
                                let handled = tokio::time::timeout(
                                    EVENT_DEADLINE,
                                    events::handle_event(&state, session_id, user_id, envelope),
                                )
                                .await;
                                if handled.is_err() {
                                    tracing::warn!(
                                        "[WS] event {} from {} exceeded deadline",
                                        event,
                                        session_id
                                    );
                                    state.registry.send_to(
                                        session_id,
                                        Envelope::error(&event, "deadline exceeded"),
                                    );
                                }
                            }
                            Err(e) => {
                                state.registry.send_to(
                                    session_id,
                                    Envelope::error("unknown", format!("malformed envelope: {e}")),
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("[WS] session {} closed by client", session_id);
                        break;
                    }
                    // Ping/pong are answered by the transport; binary
                    // frames are not part of this protocol.
                    Some(Ok(Message::Ping(_)) | Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) => {
                        state.registry.send_to(
                            session_id,
                            Envelope::error("unknown", "binary frames are not supported"),
                        );
                    }
                    Some(Err(e)) => {
                        tracing::warn!("[WS] session {} socket error: {}", session_id, e);
                        break;
                    }
                }
            }
        }
    }

    // Departure: leave rooms with their broadcasts and last-viewer
    // write-through, then drop the session. Broadcasts already queued to
    // other sessions are unaffected.
    events::leave_rooms(&state, session_id, user_id).await;
    state.registry.unregister(session_id);
    let _ = writer.await;
    tracing::info!("[WS] session {} cleaned up", session_id);
}
