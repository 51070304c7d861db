/**
 * Server Configuration
 *
 * Configuration comes from environment variables, with development
 * defaults where a missing value is survivable. A missing durable store
 * or hot tier degrades the corresponding tier; a missing token secret
 * gets a loud warning and a development-only default.
 */

/// The recognized options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Service-level component of the version clock (`SERVICE_VERSION`).
    pub service_version: u64,
    /// Connection target for the authoritative store (`DATABASE_URL`).
    pub database_url: Option<String>,
    /// Connection target for the shared cache (`HOT_TIER_URL`).
    pub hot_tier_url: Option<String>,
    /// Key for the session-token verifier (`TOKEN_SECRET`).
    pub token_secret: String,
    /// Bind port for HTTP + upgrade endpoint (`LISTEN_PORT`).
    pub listen_port: u16,
    /// OAuth client credentials for the auth endpoint.
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

impl ServerConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let service_version = std::env::var("SERVICE_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let database_url = std::env::var("DATABASE_URL").ok();
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set. Durable store features will be disabled.");
        }

        let hot_tier_url = std::env::var("HOT_TIER_URL").ok();
        if hot_tier_url.is_none() {
            tracing::warn!("HOT_TIER_URL not set. Falling back to the in-process cache.");
        }

        let token_secret = std::env::var("TOKEN_SECRET").unwrap_or_else(|_| {
            tracing::warn!("TOKEN_SECRET not set; using a development default");
            "dev-secret-change-in-production".to_string()
        });

        let listen_port = std::env::var("LISTEN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        Self {
            service_version,
            database_url,
            hot_tier_url,
            token_secret,
            listen_port,
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
        }
    }
}
