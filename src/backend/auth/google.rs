/**
 * Google OAuth Code Exchange
 *
 * This module implements POST /auth/google. The client finishes the
 * provider's consent flow and posts the authorization code here; the
 * server exchanges it for an access token, reads the user's profile,
 * upserts the user row, records a login row, and answers with a bearer
 * token for the socket.
 *
 * # Security
 *
 * - The client secret never leaves the server.
 * - Invalid or replayed codes answer 401 without detail.
 * - Provider outages answer 502; the socket surface is unaffected.
 */
use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::backend::auth::{sessions::create_token, users};
use crate::backend::server::state::AppState;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for the code exchange.
#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub code: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Successful exchange: the bearer token plus the user it names.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: users::User,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Exchange an OAuth code for a session token.
pub async fn google_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<GoogleAuthRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        tracing::error!("[Auth] database not configured");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    if request.code.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (client_id, client_secret) = match (
        &state.config.google_client_id,
        &state.config.google_client_secret,
    ) {
        (Some(id), Some(secret)) => (id.clone(), secret.clone()),
        _ => {
            tracing::error!("[Auth] google client credentials not configured");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    let profile = exchange_code(&request, &client_id, &client_secret).await?;

    let user = users::upsert_google_user(
        pool,
        &profile.id,
        &profile.email,
        profile.name.as_deref().unwrap_or(&profile.email),
        profile.picture.as_deref(),
    )
    .await
    .map_err(|e| {
        tracing::error!("[Auth] user upsert failed: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    if let Err(e) = users::record_login(
        pool,
        user.id,
        request.platform.as_deref(),
        Some(&addr.ip().to_string()),
        user_agent.as_deref(),
    )
    .await
    {
        // Login bookkeeping must not block the login itself.
        tracing::warn!("[Auth] failed to record login for {}: {:?}", user.id, e);
    }

    let token = create_token(
        &state.config.token_secret,
        user.id,
        &user.email,
        Some(&user.name),
    )
    .map_err(|e| {
        tracing::error!("[Auth] failed to create token: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    tracing::info!("[Auth] user logged in: {} ({})", user.name, user.email);
    Ok(Json(AuthResponse { token, user }))
}

/// Run the two provider round-trips: code → access token → profile.
async fn exchange_code(
    request: &GoogleAuthRequest,
    client_id: &str,
    client_secret: &str,
) -> Result<GoogleUserInfo, StatusCode> {
    let client = reqwest::Client::builder()
        .timeout(EXCHANGE_TIMEOUT)
        .build()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut form = vec![
        ("code", request.code.clone()),
        ("client_id", client_id.to_string()),
        ("client_secret", client_secret.to_string()),
        ("grant_type", "authorization_code".to_string()),
    ];
    if let Some(redirect_uri) = &request.redirect_uri {
        form.push(("redirect_uri", redirect_uri.clone()));
    }

    let token_response = client
        .post(TOKEN_ENDPOINT)
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("[Auth] token exchange unreachable: {:?}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !token_response.status().is_success() {
        tracing::warn!(
            "[Auth] token exchange rejected with status {}",
            token_response.status()
        );
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token: GoogleTokenResponse = token_response
        .json()
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)?;

    let userinfo_response = client
        .get(USERINFO_ENDPOINT)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("[Auth] userinfo unreachable: {:?}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !userinfo_response.status().is_success() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    userinfo_response
        .json()
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)
}
