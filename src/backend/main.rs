/**
 * xfdocs Server Entry Point
 *
 * Boots the collaborative document server: tracing, configuration, both
 * storage tiers, the HTTP + socket surface, and a graceful-shutdown hook
 * that closes every session and writes dirty documents through.
 */
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let (app, state) = xfdocs::backend::server::init::create_app().await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.listen_port));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_state = state.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Shutdown signal received");
        shutdown_state.lifecycle.shutdown().await;
    })
    .await?;

    Ok(())
}
