//! TrailWeaver Engine - server entrypoint.
//!
//! The engine:
//! - serves the route catalog and personalized recommendations
//! - generates themed route stories via a local Ollama endpoint
//! - records completions as souvenirs with XP, summaries, and pixel art
//! - evaluates achievement rules

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trailweaver_engine::api;
use trailweaver_engine::app::App;
use trailweaver_engine::config::AppConfig;
use trailweaver_engine::infrastructure::persistence::connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trailweaver_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TrailWeaver Engine");

    // Load configuration once
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Database: {}", config.database_path);
    tracing::info!("  Ollama: {} ({})", config.llm.base_url, config.llm.model);
    tracing::info!("  History artifacts: {}", config.history_dir);

    // Open the database and assemble the application
    let pool = connection::connect(&config.database_path).await?;
    let llm = App::production_llm(&config);
    let server_port = config.server_port;
    let app = Arc::new(App::assemble(config, pool, llm));

    // Startup seeding: achievement rules, optional route catalog
    app.seed().await?;
    tracing::info!("Application state initialized");

    // Cache sweeper (removes expired adjusted-vector entries)
    let cache_sweeper = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let interval = std::time::Duration::from_secs(
                app.config.recommendation.adjusted_vector_ttl_secs.max(60),
            );
            loop {
                tokio::time::sleep(interval).await;
                let removed = app.use_cases.recommendation.sweep_cache().await;
                if removed > 0 {
                    tracing::debug!(removed, "Swept adjusted-vector cache");
                }
            }
        })
    };

    // Build the router
    let router = api::routes()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router);

    // Run until Ctrl+C
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            cache_sweeper.abort();
        }
    }

    Ok(())
}
