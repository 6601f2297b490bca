use anyhow::{anyhow, Context, Result};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher};

use super::schema::IndexSchema;
use super::store::IndexLocation;
use super::WRITER_HEAP_BYTES;
use crate::git::repos::resolve_git_dir;

/// An open repository index with its lazily created writer and cached reader.
pub struct RepoIndex {
    pub name: String,
    pub location: IndexLocation,
    pub index: Index,
    pub fields: IndexSchema,
    writer: Mutex<Option<IndexWriter>>,
    reader: Mutex<Option<IndexReader>>,
}

impl RepoIndex {
    /// The writer, created on first use.
    pub fn writer(&self) -> Result<MappedMutexGuard<'_, IndexWriter>> {
        let mut slot = self.writer.lock();
        if slot.is_none() {
            let writer = self
                .index
                .writer(WRITER_HEAP_BYTES)
                .with_context(|| format!("Failed to create index writer for {}", self.name))?;
            *slot = Some(writer);
        }
        MutexGuard::try_map(slot, Option::as_mut)
            .map_err(|_| anyhow!("Index writer for {} is unavailable", self.name))
    }

    /// A searcher over the last state observed by the cached reader. Call
    /// [`RepoIndex::reset_searcher`] after writing to see new documents.
    pub fn searcher(&self) -> Result<Searcher> {
        let mut cached = self.reader.lock();
        if let Some(reader) = cached.as_ref() {
            return Ok(reader.searcher());
        }
        let reader: IndexReader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .with_context(|| format!("Failed to create reader for {}", self.name))?;
        let searcher = reader.searcher();
        *cached = Some(reader);
        Ok(searcher)
    }

    pub fn reset_searcher(&self) {
        self.reader.lock().take();
    }

    /// Wait for merges and release the writer and reader. Uncommitted
    /// changes are discarded.
    pub fn close(&self) {
        self.reset_searcher();
        if let Some(writer) = self.writer.lock().take() {
            if let Err(e) = writer.wait_merging_threads() {
                tracing::warn!("Failed to close index writer for {}: {e}", self.name);
            }
        }
    }
}

/// Lazily opened indexes of every repository under one folder.
pub struct IndexRegistry {
    repositories_dir: PathBuf,
    indexes: RwLock<HashMap<String, Arc<RepoIndex>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexRegistry {
    pub fn new(repositories_dir: impl Into<PathBuf>) -> Self {
        Self {
            repositories_dir: repositories_dir.into(),
            indexes: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repositories_dir(&self) -> &std::path::Path {
        &self.repositories_dir
    }

    pub fn location(&self, repo: &str) -> IndexLocation {
        IndexLocation::for_git_dir(&resolve_git_dir(&self.repositories_dir, repo))
    }

    pub fn has_index(&self, repo: &str) -> bool {
        self.location(repo).has_index()
    }

    /// Lock serializing maintenance of `repo`. Unrelated repositories have
    /// independent locks.
    pub fn repository_lock(&self, repo: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(repo.to_string())
            .or_default()
            .clone()
    }

    /// The index of `repo`, opened (or created empty) on first use.
    pub fn open(&self, repo: &str) -> Result<Arc<RepoIndex>> {
        if let Some(index) = self.indexes.read().get(repo) {
            return Ok(index.clone());
        }
        let mut indexes = self.indexes.write();
        if let Some(index) = indexes.get(repo) {
            return Ok(index.clone());
        }
        let location = self.location(repo);
        let (index, fields) = location
            .open_or_create()
            .with_context(|| format!("Failed to open index of {repo}"))?;
        let opened = Arc::new(RepoIndex {
            name: repo.to_string(),
            location,
            index,
            fields,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        });
        indexes.insert(repo.to_string(), opened.clone());
        Ok(opened)
    }

    /// Searcher for `repo`, or `None` when it has no current index.
    pub fn searcher(&self, repo: &str) -> Result<Option<(Arc<RepoIndex>, Searcher)>> {
        if !self.has_index(repo) {
            return Ok(None);
        }
        let index = self.open(repo)?;
        let searcher = index.searcher()?;
        Ok(Some((index, searcher)))
    }

    pub fn reset_searcher(&self, repo: &str) {
        if let Some(index) = self.indexes.read().get(repo) {
            index.reset_searcher();
        }
    }

    pub fn close(&self, repo: &str) {
        let removed = self.indexes.write().remove(repo);
        if let Some(index) = removed {
            index.close();
            tracing::debug!("Closed index of {repo}");
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<_> = self.indexes.write().drain().collect();
        for (name, index) in drained {
            index.close();
            tracing::debug!("Closed index of {name}");
        }
    }
}
