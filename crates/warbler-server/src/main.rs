use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use warbler_api::state::{AppState, AppStateInner};

const DEV_SECRET: &str = "it's a secret";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warbler=debug,warbler_api=debug,warbler_db=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let secret_key = match std::env::var("WARBLER_SECRET_KEY") {
        Ok(key) if !key.trim().is_empty() && key != "change-me" => key,
        _ => {
            warn!("WARBLER_SECRET_KEY is not set; sessions are signed with a development key");
            DEV_SECRET.to_string()
        }
    };
    let db_path = std::env::var("WARBLER_DB_PATH").unwrap_or_else(|_| "warbler.db".into());
    let host = std::env::var("WARBLER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WARBLER_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;
    let static_dir = std::env::var("WARBLER_STATIC_DIR").unwrap_or_else(|_| "./static".into());

    let db = warbler_db::Database::open(&PathBuf::from(&db_path))?;

    let state = AppStateInner::new(db, secret_key)?;

    let app = app(state, Path::new(&static_dir));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Warbler listening on {} (static files from {})", addr, static_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Warbler routes plus `/static`, which also holds the default profile images.
fn app(state: AppState, static_dir: &Path) -> Router {
    warbler_api::router(state)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
