//! Per-repository full-text indexes over commits, files and issues.
//!
//! Each repository gets its own tantivy index next to its git data. The
//! [`engine::SearchEngine`] keeps those indexes in step with the repository
//! history (full rebuild or incremental update) and answers ranked,
//! highlighted queries over one or several of them.

pub mod branches;
pub mod composite;
pub mod documents;
pub mod engine;
pub mod highlight;
pub mod policy;
pub mod query;
pub mod registry;
pub mod reindex;
pub mod schema;
pub mod state;
pub mod store;
pub mod update;

pub use engine::SearchEngine;
pub use highlight::HighlightMarkup;
pub use policy::IndexPolicy;

/// Format version of the on-disk index. An index recorded with any other
/// version is treated as absent and rebuilt.
pub const INDEX_VERSION: u32 = 1;

/// Upper bound on hits collected per query before pagination.
pub const MAX_HITS: usize = 5000;

/// Heap given to each repository's index writer.
pub const WRITER_HEAP_BYTES: usize = 50_000_000;
