use axum::routing::{delete, get, post};
use axum::Router;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use history_search::api;
use history_search::config::Config;
use history_search::maintenance::run_cycle;
use history_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Repositories folder: {}", config.repositories_dir.display());

    let state = AppState::new(config.clone())?;

    if config.indexing_enabled {
        let config = config.clone();
        let engine = state.engine.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(config.index_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let config = config.clone();
                let engine = engine.clone();
                let cycle = tokio::task::spawn_blocking(move || run_cycle(&config, &engine)).await;
                if let Err(e) = cycle {
                    tracing::error!("Maintenance cycle panicked: {e}");
                }
            }
        });
    } else {
        tracing::info!("Background indexing is disabled");
    }

    let app = Router::new()
        .route("/api/search", get(api::search::search))
        .route("/api/repos", get(api::repos::list_repos))
        .route("/api/repos/{name}/reindex", post(api::repos::reindex_repo))
        .route("/api/repos/{name}/update", post(api::repos::update_repo))
        .route("/api/repos/{name}/index", delete(api::repos::delete_index))
        .route(
            "/api/repos/{name}/issues/{id}",
            post(api::repos::index_issue).delete(api::repos::delete_issue),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    state.engine.cancel();
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || engine.close_all()).await?;
    tracing::info!("Indexes closed");
    Ok(())
}
