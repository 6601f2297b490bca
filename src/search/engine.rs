use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tantivy::schema::TantivyDocument;

use super::composite::CompositeReader;
use super::highlight::{HighlightMarkup, Highlighter};
use super::policy::IndexPolicy;
use super::query::{build_query, execute, to_result, wildcard_patterns};
use super::registry::IndexRegistry;
use super::reindex::{rebuild, IndexContext};
use super::update::{apply_updates, reindex_issue};
use super::INDEX_VERSION;
use crate::git::ObjectStore;
use crate::models::{IndexResult, RepositoryModel, SearchResult};

/// Builds, maintains and queries the indexes of the repositories in one
/// folder.
///
/// Maintenance of a repository holds that repository's lock, so calls for
/// different repositories may run in parallel while calls for the same
/// repository queue up.
pub struct SearchEngine {
    registry: IndexRegistry,
    policy: RwLock<IndexPolicy>,
    markup: HighlightMarkup,
    cancel: AtomicBool,
}

impl SearchEngine {
    pub fn new(repositories_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: IndexRegistry::new(repositories_dir),
            policy: RwLock::new(IndexPolicy::default()),
            markup: HighlightMarkup::default(),
            cancel: AtomicBool::new(false),
        }
    }

    pub fn with_markup(mut self, markup: HighlightMarkup) -> Self {
        self.markup = markup;
        self
    }

    pub fn with_policy(self, policy: IndexPolicy) -> Self {
        self.set_policy(policy);
        self
    }

    pub fn set_policy(&self, policy: IndexPolicy) {
        *self.policy.write() = policy;
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Ask running reindex/update calls to stop at the next branch.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn has_index(&self, repo: &str) -> bool {
        self.registry.has_index(repo)
    }

    /// Bring the index of `repo` up to date: a full rebuild when there is no
    /// current index, an incremental update otherwise.
    pub fn index(&self, repo: &RepositoryModel, store: &dyn ObjectStore) -> IndexResult {
        if !repo.has_indexed_branches() {
            match self.delete_index(&repo.name) {
                Ok(true) => tracing::info!("Deleted index of {}: no branches selected", repo.name),
                Ok(false) => {}
                Err(e) => tracing::error!("{e:#}"),
            }
            return IndexResult::start().succeed();
        }
        match store.local_branches() {
            Ok(branches) if branches.is_empty() => {
                tracing::info!("Skipping {}: repository has no branches", repo.name);
                return IndexResult::start().succeed();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Failed to list branches of {}: {e:#}", repo.name);
                return IndexResult::start().fail();
            }
        }

        if self.has_index(&repo.name) {
            let result = self.update(repo, store);
            if result.success && result.commit_count + result.issue_count > 0 {
                tracing::info!(
                    "Updated {} index with {} commits and {} issues in {:.1} secs",
                    repo.name,
                    result.commit_count,
                    result.issue_count,
                    result.duration_secs()
                );
            }
            result
        } else {
            let result = self.reindex(repo, store);
            if result.success {
                tracing::info!(
                    "Built {} index from {} commits and {} files across {} branches in {:.1} secs",
                    repo.name,
                    result.commit_count,
                    result.blob_count,
                    result.branch_count,
                    result.duration_secs()
                );
            }
            result
        }
    }

    /// Discard the index of `repo` and build it again from its history.
    pub fn reindex(&self, repo: &RepositoryModel, store: &dyn ObjectStore) -> IndexResult {
        let started = IndexResult::start();
        let lock = self.registry.repository_lock(&repo.name);
        let _guard = lock.lock();
        self.reindex_locked(repo, store, started)
    }

    /// Callers hold the repository lock.
    fn reindex_locked(
        &self,
        repo: &RepositoryModel,
        store: &dyn ObjectStore,
        started: IndexResult,
    ) -> IndexResult {
        match self.try_reindex(repo, store) {
            Ok(result) => result.succeed(),
            Err(e) => {
                tracing::error!("Reindex of {} failed: {e:#}", repo.name);
                self.registry.close(&repo.name);
                started.fail()
            }
        }
    }

    fn try_reindex(&self, repo: &RepositoryModel, store: &dyn ObjectStore) -> Result<IndexResult> {
        self.registry.close(&repo.name);
        self.registry
            .location(&repo.name)
            .delete()
            .with_context(|| format!("Failed to delete old index of {}", repo.name))?;

        let index = self.registry.open(&repo.name)?;
        let policy = self.policy.read().clone();
        let ctx = IndexContext {
            store,
            fields: &index.fields,
            policy: &policy,
            cancel: &self.cancel,
        };
        let mut writer = index.writer()?;
        let (result, state) = match rebuild(&ctx, &writer, repo) {
            Ok(built) => built,
            Err(e) => {
                writer.rollback()?;
                return Err(e);
            }
        };
        writer.commit().context("Failed to commit index")?;
        drop(writer);
        state.save(&index.location.state_path())?;
        index.reset_searcher();
        Ok(result)
    }

    /// Index what changed in `repo` since the last run. A missing index, or
    /// one written by another format version, is rebuilt instead.
    pub fn update(&self, repo: &RepositoryModel, store: &dyn ObjectStore) -> IndexResult {
        let started = IndexResult::start();
        let lock = self.registry.repository_lock(&repo.name);
        let _guard = lock.lock();
        if !self.registry.has_index(&repo.name) {
            tracing::info!("No current index for {}, rebuilding", repo.name);
            return self.reindex_locked(repo, store, started);
        }
        match self.try_update(repo, store) {
            Ok(result) => result.succeed(),
            Err(e) => {
                tracing::error!("Update of {} index failed: {e:#}", repo.name);
                started.fail()
            }
        }
    }

    fn try_update(&self, repo: &RepositoryModel, store: &dyn ObjectStore) -> Result<IndexResult> {
        let index = self.registry.open(&repo.name)?;
        let mut state = index.location.load_state()?;
        if !state.is_current() {
            bail!("Index state of {} is not at version {INDEX_VERSION}", repo.name);
        }
        let policy = self.policy.read().clone();
        let ctx = IndexContext {
            store,
            fields: &index.fields,
            policy: &policy,
            cancel: &self.cancel,
        };
        let mut writer = index.writer()?;
        let outcome = apply_updates(
            &ctx,
            &mut writer,
            repo,
            &mut state,
            &index.location.state_path(),
        );
        // finished branches are committed; only the branch in flight is lost
        if outcome.is_err() {
            writer.rollback()?;
        }
        drop(writer);
        index.reset_searcher();
        outcome
    }

    /// Re-read one issue and replace its document, or remove the document
    /// when the issue no longer exists.
    pub fn index_issue(
        &self,
        repo: &str,
        store: &dyn ObjectStore,
        issue_id: &str,
    ) -> Result<bool> {
        let lock = self.registry.repository_lock(repo);
        let _guard = lock.lock();
        let index = self.registry.open(repo)?;
        let mut writer = index.writer()?;
        let written = reindex_issue(store, &index.fields, &writer, issue_id)?;
        writer.commit().context("Failed to commit issue")?;
        drop(writer);
        index.reset_searcher();
        Ok(written)
    }

    pub fn delete_issue(&self, repo: &str, issue_id: &str) -> Result<()> {
        let lock = self.registry.repository_lock(repo);
        let _guard = lock.lock();
        let index = self.registry.open(repo)?;
        let mut writer = index.writer()?;
        super::documents::delete_issue(&writer, &index.fields, issue_id)?;
        writer.commit().context("Failed to commit issue deletion")?;
        drop(writer);
        index.reset_searcher();
        Ok(())
    }

    /// Remove the index and state of `repo`. Returns `false` when it had none.
    pub fn delete_index(&self, repo: &str) -> Result<bool> {
        let lock = self.registry.repository_lock(repo);
        let _guard = lock.lock();
        self.registry.close(repo);
        self.registry
            .location(repo)
            .delete()
            .with_context(|| format!("Failed to delete index of {repo}"))
    }

    /// Ranked results `[(page - 1) * page_size, page * page_size)` for `text`
    /// across `repos`. Pages are 1-based.
    pub fn search(
        &self,
        text: &str,
        page: usize,
        page_size: usize,
        repos: &[String],
    ) -> Result<Vec<SearchResult>> {
        Ok(self.search_page(text, page, page_size, repos)?.1)
    }

    /// Like [`SearchEngine::search`], also returning the total hit count,
    /// which is known even when the page is past the last hit.
    pub fn search_page(
        &self,
        text: &str,
        page: usize,
        page_size: usize,
        repos: &[String],
    ) -> Result<(usize, Vec<SearchResult>)> {
        if repos.is_empty() {
            bail!("No repositories to search");
        }
        let page = page.max(1);
        let page_size = page_size.max(1);

        let mut opened = Vec::new();
        let mut sources = Vec::new();
        for repo in repos {
            if sources.iter().any(|(name, _)| name == repo) {
                continue;
            }
            match self.registry.searcher(repo)? {
                Some((index, searcher)) => {
                    opened.push(index);
                    sources.push((repo.clone(), searcher));
                }
                None => tracing::debug!("Not searching {repo}: no index"),
            }
        }
        let Some(first) = opened.first() else {
            return Ok((0, Vec::new()));
        };

        let query = build_query(&first.index, &first.fields, text)?;
        let reader = CompositeReader::new(sources);
        let (total_hits, hits) = execute(&reader, query.as_ref())?;
        let highlighter = Highlighter::new(
            &reader,
            query.as_ref(),
            &wildcard_patterns(text),
            first.fields.content,
            &self.markup,
        )?;

        let offset = (page - 1) * page_size;
        let results = hits
            .iter()
            .enumerate()
            .skip(offset)
            .take(page_size)
            .map(|(rank, hit)| {
                let doc: TantivyDocument = reader
                    .searcher(hit.source)
                    .doc(hit.address)
                    .context("Failed to retrieve document")?;
                Ok(to_result(
                    &opened[hit.source].fields,
                    &doc,
                    reader.repository(hit.source),
                    hit,
                    rank + 1,
                    total_hits,
                    &highlighter,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((total_hits, results))
    }

    pub fn close(&self, repo: &str) {
        self.registry.close(repo);
    }

    pub fn close_all(&self) {
        self.registry.close_all();
    }
}
