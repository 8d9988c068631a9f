//! StylesSync API Server
//!
//! HTTP API serving the skin-tone classifier and the size model. Both models
//! are loaded once at startup; a model that fails to load is reported as
//! unavailable instead of being served with random weights.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use stylesync_ai::utils::logging::{init_logging, LogConfig, LogLevel};

use crate::state::{AppState, ServerConfig, SharedState};

/// StylesSync API Server
#[derive(Parser, Debug)]
#[command(name = "stylesync-server")]
#[command(version)]
#[command(about = "HTTP API for skin-tone and size prediction")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "STYLESYNC_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "STYLESYNC_HOST")]
    host: String,

    /// Best skin-tone checkpoint
    #[arg(long, env = "STYLESYNC_SKIN_TONE_MODEL")]
    skin_tone_model: Option<PathBuf>,

    /// Fitted size model
    #[arg(long, env = "STYLESYNC_SIZE_MODEL")]
    size_model: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "STYLESYNC_LOG")]
    log_level: String,
}

fn router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/predict_skin_tone", post(routes::skin_tone::predict_skin_tone))
        .route("/predict_size", post(routes::size::predict_size))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: LogLevel::parse(&cli.log_level),
        ..LogConfig::production()
    };
    let _ = init_logging(&log_config);

    let mut config = ServerConfig {
        host: cli.host,
        port: cli.port,
        ..Default::default()
    };
    if let Some(path) = cli.skin_tone_model {
        config.skin_tone_checkpoint = path;
    }
    if let Some(path) = cli.size_model {
        config.size_model = path;
    }

    info!("StylesSync API Server v{}", stylesync_ai::VERSION);
    info!("Configuration:");
    info!("  Skin-tone checkpoint: {:?}", config.skin_tone_checkpoint);
    info!("  Size model:           {:?}", config.size_model);

    let state = Arc::new(AppState::load(&config));
    let app = router(state, config.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
