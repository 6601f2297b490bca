use std::sync::Arc;

use crate::config::Config;
use crate::search::{IndexPolicy, SearchEngine};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<SearchEngine>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.repositories_dir)?;
        let engine =
            SearchEngine::new(config.repositories_dir.clone()).with_policy(IndexPolicy::from_env());
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }
}
