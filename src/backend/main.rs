/**
 * Progress Server Entry Point
 *
 * Loads configuration from the environment, builds the application, and
 * serves it until interrupted.
 */

use pathsync::backend::server::config::ServerConfig;
use pathsync::backend::server::init::create_app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = ServerConfig::from_env();
    let port = config.port;
    let app = create_app(config).await?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[Server] Progress server running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("[Server] Progress server stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("[Server] Shutting down"),
        Err(e) => {
            tracing::error!("[Server] Could not install shutdown handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
