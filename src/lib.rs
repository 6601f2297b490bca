//! # repo-history-search
//!
//! Full-text search over the history of a folder of git repositories:
//! every commit, the current content of every file on the indexed branches,
//! and the issues kept on a repository's issues branch.
//!
//! ## Architecture
//!
//! ```text
//!   repositories/            ┌──────────────────┐
//!   ├── app.git ───────────▶ │  GitObjectStore  │  branches, trees, diffs,
//!   └── lib/.git             └────────┬─────────┘  blobs, issues
//!                                     │
//!                     ┌───────────────┴───────────────┐
//!                     ▼                               ▼
//!            ┌─────────────────┐             ┌─────────────────┐
//!            │  Full reindex   │             │ Incremental     │
//!            │  (no / outdated │             │ update (delta   │
//!            │   index)        │             │ since last tips)│
//!            └────────┬────────┘             └────────┬────────┘
//!                     └───────────────┬───────────────┘
//!                                     ▼
//!                    <git dir>/search-index/{state.toml, segments/}
//!                                     │
//!                                     ▼
//!            ┌──────────────────────────────────────────────┐
//!            │ Query: parse + wildcards → per-repo searchers │
//!            │ → composite ranking → page → highlight        │
//!            └──────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server and maintenance cycle
//! - [`models`] - Shared data types: repositories, issues, search results, index counters
//! - [`git`] - The object store interface and its libgit2 implementation; repository discovery
//! - [`search::registry`] - Open indexes with their cached writers and searchers, per-repository locks
//! - [`search::state`] - Per-repository index state (format version, indexed branch tips)
//! - [`search::reindex`] / [`search::update`] - Full rebuild and incremental maintenance
//! - [`search::query`] / [`search::composite`] - Query parsing and multi-repository ranking
//! - [`search::highlight`] - Highlighted fragments with line numbers
//! - [`search::policy`] - Excluded extensions and blob encodings
//! - [`maintenance`] - One pass over every repository
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod git;
pub mod maintenance;
pub mod models;
pub mod search;
pub mod state;
