use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::git::repos::resolve_git_dir;
use crate::git::{discover_repositories, GitObjectStore};
use crate::models::{IndexResult, RepositoryModel, RepositoryStatus};
use crate::state::AppState;

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Look up a repository by name among the ones on disk.
async fn find_repository(state: &AppState, name: &str) -> Result<RepositoryModel, ApiError> {
    let dir = state.config.repositories_dir.clone();
    let defaults = state.config.default_indexed_branches.clone();
    let repos = tokio::task::spawn_blocking(move || discover_repositories(&dir, &defaults))
        .await
        .map_err(internal)?;
    repos
        .into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown repository {name}")))
}

/// GET /api/repos - Repositories on disk and whether they are indexed
pub async fn list_repos(
    State(state): State<AppState>,
) -> Result<Json<Vec<RepositoryStatus>>, ApiError> {
    let dir = state.config.repositories_dir.clone();
    let defaults = state.config.default_indexed_branches.clone();
    let engine = state.engine.clone();
    let statuses = tokio::task::spawn_blocking(move || {
        discover_repositories(&dir, &defaults)
            .into_iter()
            .map(|r| RepositoryStatus {
                has_index: engine.has_index(&r.name),
                name: r.name,
                indexed_branches: r.indexed_branches,
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(internal)?;
    Ok(Json(statuses))
}

#[derive(Clone, Copy)]
enum Maintenance {
    Reindex,
    Update,
}

async fn run_maintenance(
    state: AppState,
    name: String,
    kind: Maintenance,
) -> Result<(StatusCode, Json<IndexResult>), ApiError> {
    let repo = find_repository(&state, &name).await?;
    let path = resolve_git_dir(&state.config.repositories_dir, &repo.name);
    let engine = state.engine.clone();
    let result = tokio::task::spawn_blocking(move || {
        let store = GitObjectStore::open(&path)?;
        let result = match kind {
            Maintenance::Reindex => engine.reindex(&repo, &store),
            Maintenance::Update => engine.update(&repo, &store),
        };
        anyhow::Ok(result)
    })
    .await
    .map_err(internal)?
    .map_err(|e| internal(format!("{e:#}")))?;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(result)))
}

/// POST /api/repos/{name}/reindex - Rebuild the index from scratch
pub async fn reindex_repo(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<IndexResult>), ApiError> {
    tracing::info!("Reindex of {name} requested");
    run_maintenance(state, name, Maintenance::Reindex).await
}

/// POST /api/repos/{name}/update - Index changes since the last run
pub async fn update_repo(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<IndexResult>), ApiError> {
    run_maintenance(state, name, Maintenance::Update).await
}

/// DELETE /api/repos/{name}/index - Remove the index and its state
pub async fn delete_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let engine = state.engine.clone();
    let deleted = tokio::task::spawn_blocking(move || engine.delete_index(&name))
        .await
        .map_err(internal)?
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(if deleted {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

/// POST /api/repos/{name}/issues/{id} - Re-index one issue
pub async fn index_issue(
    State(state): State<AppState>,
    Path((name, issue_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let repo = find_repository(&state, &name).await?;
    let path = resolve_git_dir(&state.config.repositories_dir, &repo.name);
    let engine = state.engine.clone();
    let id = issue_id.clone();
    let indexed = tokio::task::spawn_blocking(move || {
        let store = GitObjectStore::open(&path)?;
        engine.index_issue(&repo.name, &store, &id)
    })
    .await
    .map_err(internal)?
    .map_err(|e| {
        tracing::warn!("Failed to index issue {issue_id} of {name}: {e:#}");
        internal(format!("{e:#}"))
    })?;
    Ok(Json(json!({ "issue": issue_id, "indexed": indexed })))
}

/// DELETE /api/repos/{name}/issues/{id} - Drop one issue from the index
pub async fn delete_issue(
    State(state): State<AppState>,
    Path((name, issue_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let repo = find_repository(&state, &name).await?;
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || engine.delete_issue(&repo.name, &issue_id))
        .await
        .map_err(internal)?
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(StatusCode::NO_CONTENT)
}
