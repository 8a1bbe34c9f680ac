use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::filter::Directive;

mod config;
mod db;
mod error;
mod quest;
mod routes;

use config::ServerConfig;
use db::Database;
use quest::QuestRegistry;
use routes::AppState;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let config_path = ServerConfig::path();
    let loaded = ServerConfig::try_load_from(&config_path);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    let directive = config.log_directive.parse::<Directive>();
    if let Ok(directive) = &directive {
        filter = filter.add_directive(directive.clone());
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = loaded {
        warn!("{}; using default config", e);
    }
    if let Err(e) = directive {
        warn!("Ignoring log directive '{}': {}", config.log_directive, e);
    }

    // Initialize database
    let db = match Database::new(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database {}: {}", config.database_url, e);
            return;
        }
    };

    // Load stored quests, then seed files
    let registry = Arc::new(QuestRegistry::new(&config.data_dir).with_database(db));
    match registry.load_all().await {
        Ok(count) => info!("Quest registry ready with {} quests", count),
        Err(e) => error!("Failed to load quest registry: {}", e),
    }

    // Start hot-reload watcher for seed quest files (dev mode by default)
    if config.hot_reload {
        match registry.start_file_watcher() {
            Ok(mut rx) => {
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        match event {
                            quest::HotReloadEvent::Reloaded(path) => {
                                info!("Quest hot-reload: {}", path);
                            }
                            quest::HotReloadEvent::Error(e) => {
                                error!("Quest hot-reload error: {}", e);
                            }
                        }
                    }
                });
                info!("Quest hot-reload enabled");
            }
            Err(e) => {
                warn!("Failed to start quest hot-reload: {}", e);
            }
        }
    }

    let app = routes::router(AppState { registry });

    let addr = config.listen_addr;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("Quest server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
