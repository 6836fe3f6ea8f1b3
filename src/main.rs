use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use voiceloop_backend::config::Config;
use voiceloop_backend::routes;
use voiceloop_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "voiceloop_backend=debug,tower_http=info".to_string()),
        )
        .init();

    // Load configuration - fall back to defaults when no file is present
    let config_paths: Vec<String> = vec![
        std::env::var("CONFIG_PATH").ok(),
        Some("conf.yaml".to_string()),
        Some("config/conf.yaml".to_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut config = None;
    for path in &config_paths {
        match Config::load(path) {
            Ok(cfg) => {
                info!("Loaded configuration from: {}", path);
                config = Some(cfg);
                break;
            }
            Err(e) => {
                tracing::debug!("Failed to load config from {}: {}", path, e);
                continue;
            }
        }
    }
    let config = config.unwrap_or_else(|| {
        info!("No config file found, using defaults");
        Config::default()
    });

    std::fs::create_dir_all(&config.agent.history_dir)?;

    // Initialize app state (providers are constructed once and shared)
    let app_state = AppState::new(config.clone())?;

    // Build application
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
