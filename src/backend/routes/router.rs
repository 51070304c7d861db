/**
 * Router Configuration
 *
 * The HTTP surface is deliberately small: the auth endpoint and the
 * socket upgrade. Everything else travels as events over the socket.
 */
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::backend::auth::google::google_auth;
use crate::backend::server::state::AppState;
use crate::backend::ws::ws_handler;

/// Create the Axum router with all routes configured.
///
/// - `POST /auth/google`: OAuth code exchange, answers `{token, user}`
/// - `GET /ws?token=<bearer>`: persistent socket upgrade
pub fn create_router(app_state: AppState) -> Router<()> {
    Router::new()
        .route("/auth/google", post(google_auth))
        .route("/ws", get(ws_handler))
        .fallback(|| async { "404 Not Found" })
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
