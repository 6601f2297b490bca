use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use tantivy::query::QueryParserError;

use crate::models::{SearchRequest, SearchResponse};
use crate::state::AppState;

/// GET /api/search?q=..&repos=a,b&page=1&page_size=50
pub async fn search(
    State(state): State<AppState>,
    Query(req): Query<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let query = req.q.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    let repos = req.repositories();
    if repos.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one repository is required".to_string(),
        ));
    }
    let page = req.page.max(1);
    let page_size = req.page_size.unwrap_or(state.config.default_page_size).max(1);

    let engine = state.engine.clone();
    let q = query.clone();
    let (total_hits, results) =
        tokio::task::spawn_blocking(move || engine.search_page(&q, page, page_size, &repos))
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Search error: {e}"),
                )
            })?
            .map_err(|e| {
                let malformed = e.chain().any(|c| c.is::<QueryParserError>());
                if malformed {
                    (StatusCode::BAD_REQUEST, format!("{e:#}"))
                } else {
                    tracing::warn!("Search for {query:?} failed: {e:#}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Search error: {e:#}"),
                    )
                }
            })?;

    Ok(Json(SearchResponse {
        query,
        page,
        page_size,
        total_hits,
        results,
    }))
}
