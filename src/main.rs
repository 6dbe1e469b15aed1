use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use propvest::config::Config;
use propvest::db::JsonFileStore;
use propvest::AppState;

#[derive(Parser, Debug)]
#[command(name = "propvest")]
#[command(author, version, about = "Backend for the Propvest investment app", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "propvest.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Propvest v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(JsonFileStore::new(config.server.users_file()));
    tracing::info!("User store at {}", store.path().display());

    let state = Arc::new(AppState::new(config.clone(), store));
    if !state.notifier.is_configured() {
        tracing::warn!("Telegram is not configured; withdrawal notifications will fail");
    }

    let api_router = propvest::api::create_router(state.clone());

    // Serve the frontend bundle with SPA fallback when one is configured
    let app = match &config.server.static_dir {
        Some(static_dir) => {
            let index_file = static_dir.join("index.html");
            let serve_static =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));
            tracing::info!("Serving static files from {}", static_dir.display());
            axum::Router::new()
                .merge(api_router)
                .fallback_service(serve_static)
        }
        None => api_router,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
