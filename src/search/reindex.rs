use anyhow::{bail, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tantivy::IndexWriter;

use super::branches::{indexed_branches, tag_map, TagMap};
use super::documents::{blob_content, blob_document, commit_document, issue_document};
use super::policy::IndexPolicy;
use super::schema::IndexSchema;
use super::state::IndexState;
use crate::git::{BranchRef, ObjectStore};
use crate::models::{IndexResult, RepositoryModel};

/// Everything a maintenance run writes with.
pub struct IndexContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub fields: &'a IndexSchema,
    pub policy: &'a IndexPolicy,
    pub cancel: &'a AtomicBool,
}

impl IndexContext<'_> {
    pub fn check_cancelled(&self, repo: &str) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            bail!("Indexing of {repo} was cancelled");
        }
        Ok(())
    }
}

/// Add every document of `repo` to an empty index.
///
/// Returns the counters and the state describing what was indexed; the
/// caller commits the writer and persists the state.
pub fn rebuild(
    ctx: &IndexContext<'_>,
    writer: &IndexWriter,
    repo: &RepositoryModel,
) -> Result<(IndexResult, IndexState)> {
    let mut result = IndexResult::start();
    let mut state = IndexState::new();
    let tags = tag_map(ctx.store)?;

    // a commit reachable from several branches is indexed once, under the
    // first branch that reaches it
    let mut indexed_commits = HashSet::new();

    for branch in indexed_branches(ctx.store, repo, false)? {
        ctx.check_cancelled(&repo.name)?;
        let (commits, blobs) = index_branch(ctx, writer, &branch, &tags, &mut indexed_commits)?;
        tracing::debug!(
            "{}: indexed {commits} commits and {blobs} files on {}",
            repo.name,
            branch.name
        );
        result.commit_count += commits;
        result.blob_count += blobs;
        result.branch_count += 1;
        state.set_branch(&branch.name, &branch.tip);
    }

    if let Some(issues_branch) = ctx.store.issues_branch()? {
        for issue in ctx.store.issues()? {
            writer.add_document(issue_document(ctx.fields, &issue))?;
            result.issue_count += 1;
        }
        state.set_branch(&issues_branch.name, &issues_branch.tip);
    }

    Ok((result, state))
}

/// Index the files at the tip of `branch` and every commit it can reach that
/// no earlier branch already indexed. Returns (commits, files) added.
fn index_branch(
    ctx: &IndexContext<'_>,
    writer: &IndexWriter,
    branch: &BranchRef,
    tags: &TagMap,
    indexed_commits: &mut HashSet<String>,
) -> Result<(usize, usize)> {
    let history = ctx.store.history(&branch.tip)?;

    // Each file at the tip is attributed to the newest commit that changed
    // it. Merge commits are not diffed, so they never claim a file.
    let mut pending = ctx.store.tree_files(&branch.tip)?;
    let mut blobs = 0;
    for id in &history {
        if pending.is_empty() {
            break;
        }
        let commit = ctx.store.commit(id)?;
        if commit.parents.len() > 1 {
            continue;
        }
        for change in ctx.store.changed_paths(&commit)? {
            if change.is_delete() {
                continue;
            }
            let Some(blob_id) = pending.remove(&change.path) else {
                continue;
            };
            let content = blob_content(ctx.store, ctx.policy, &change.path, &blob_id);
            writer.add_document(blob_document(
                ctx.fields,
                &branch.name,
                &change.path,
                &commit,
                content.as_deref(),
            ))?;
            blobs += 1;
        }
    }
    if !pending.is_empty() {
        tracing::debug!(
            "{} files on {} were only changed by merge commits and are not indexed",
            pending.len(),
            branch.name
        );
    }

    let mut commits = 0;
    for id in &history {
        if !indexed_commits.insert(id.clone()) {
            continue;
        }
        let commit = ctx.store.commit(id)?;
        let commit_tags = tags.get(id).map(Vec::as_slice).unwrap_or_default();
        writer.add_document(commit_document(ctx.fields, &commit, &branch.name, commit_tags))?;
        commits += 1;
    }

    Ok((commits, blobs))
}
