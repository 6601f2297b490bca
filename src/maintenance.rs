use crate::config::Config;
use crate::git::repos::resolve_git_dir;
use crate::git::{discover_repositories, GitObjectStore};
use crate::models::IndexResult;
use crate::search::{IndexPolicy, SearchEngine};

/// Bring every repository under the configured folder up to date, one at a
/// time. A failing repository is logged and the cycle moves on.
///
/// The index policy is re-read from the environment first, so changes take
/// effect without a restart.
pub fn run_cycle(config: &Config, engine: &SearchEngine) -> Vec<(String, IndexResult)> {
    if !config.indexing_enabled {
        tracing::debug!("Indexing is disabled");
        return Vec::new();
    }
    engine.set_policy(IndexPolicy::from_env());

    let repos = discover_repositories(&config.repositories_dir, &config.default_indexed_branches);
    let mut results = Vec::with_capacity(repos.len());
    for repo in repos {
        if engine.is_cancelled() {
            tracing::info!("Maintenance cycle cancelled");
            break;
        }
        let path = resolve_git_dir(&config.repositories_dir, &repo.name);
        let store = match GitObjectStore::open(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("{e:#}");
                results.push((repo.name, IndexResult::start().fail()));
                continue;
            }
        };
        let result = engine.index(&repo, &store);
        results.push((repo.name, result));
    }
    results
}
