use anyhow::Result;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tantivy::IndexWriter;

use super::branches::{indexed_branches, tag_map, TagMap};
use super::documents::{
    blob_content, blob_document, commit_document, delete_blob, delete_branch, delete_issue,
    issue_document,
};
use super::reindex::IndexContext;
use super::state::IndexState;
use crate::git::{issue_id_from_summary, BranchRef, ObjectStore, ISSUES_BRANCH};
use crate::models::{IndexResult, RepositoryModel};

/// Bring an existing index up to date with `repo`.
///
/// Each branch's delta is committed and its new tip recorded in `state`
/// (saved to `state_path`) before the next branch starts, so an interrupted
/// run resumes from the last finished branch. Branches recorded in `state`
/// that no longer exist are purged at the end.
pub fn apply_updates(
    ctx: &IndexContext<'_>,
    writer: &mut IndexWriter,
    repo: &RepositoryModel,
    state: &mut IndexState,
    state_path: &Path,
) -> Result<IndexResult> {
    let mut result = IndexResult::start();
    let tags = tag_map(ctx.store)?;
    let mut deleted_branches: BTreeSet<String> = state.branch_names().into_iter().collect();

    for branch in indexed_branches(ctx.store, repo, true)? {
        ctx.check_cancelled(&repo.name)?;
        deleted_branches.remove(&branch.name);

        let prior = state.tip(&branch.name).map(str::to_string);
        if prior.as_deref() == Some(branch.tip.as_str()) {
            continue;
        }
        let delta = branch_delta(ctx.store, &branch, prior.as_deref())?;

        if branch.name == ISSUES_BRANCH {
            result.issue_count += update_issues(ctx, writer, &delta)?;
        } else {
            let (commits, blobs) = update_branch(ctx, writer, &branch, &delta, &tags)?;
            result.commit_count += commits;
            result.blob_count += blobs;
        }
        result.branch_count += 1;

        writer.commit()?;
        state.set_branch(&branch.name, &branch.tip);
        state.save(state_path)?;
    }

    for branch in deleted_branches {
        delete_branch(writer, ctx.fields, &branch);
        state.remove_branch(&branch);
        tracing::info!("Purged deleted branch {branch} from {} index", repo.name);
    }
    writer.commit()?;
    state.save(state_path)?;

    Ok(result)
}

/// Commits added to `branch` since `prior`, oldest first. A branch without a
/// recorded tip, or one whose old tip is gone, yields its whole history.
fn branch_delta(
    store: &dyn ObjectStore,
    branch: &BranchRef,
    prior: Option<&str>,
) -> Result<Vec<String>> {
    let mut delta = match prior {
        None => store.history(&branch.tip)?,
        Some(prior) => match store.history_since(prior, &branch.tip) {
            Ok(commits) => commits,
            Err(e) => {
                tracing::warn!("{e:#}; indexing the full history of {}", branch.name);
                store.history(&branch.tip)?
            }
        },
    };
    delta.reverse();
    Ok(delta)
}

fn update_branch(
    ctx: &IndexContext<'_>,
    writer: &IndexWriter,
    branch: &BranchRef,
    delta: &[String],
    tags: &TagMap,
) -> Result<(usize, usize)> {
    let mut commits = 0;
    let mut blobs = 0;
    for id in delta {
        let commit = ctx.store.commit(id)?;

        // merge commits get a commit document but never claim files
        if commit.parents.len() <= 1 {
            for change in ctx.store.changed_paths(&commit)? {
                if let Some(old_path) = &change.old_path {
                    delete_blob(writer, ctx.fields, &branch.name, old_path)?;
                }
                delete_blob(writer, ctx.fields, &branch.name, &change.path)?;
                let Some(blob_id) = &change.blob_id else {
                    continue;
                };
                let content = blob_content(ctx.store, ctx.policy, &change.path, blob_id);
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

        let commit_tags = tags.get(id).map(Vec::as_slice).unwrap_or_default();
        writer.add_document(commit_document(ctx.fields, &commit, &branch.name, commit_tags))?;
        commits += 1;
    }
    Ok((commits, blobs))
}

/// Re-index every issue touched by the issues branch commits in `delta`.
/// Returns the number of issue documents written.
fn update_issues(ctx: &IndexContext<'_>, writer: &IndexWriter, delta: &[String]) -> Result<usize> {
    let mut seen = HashSet::new();
    let mut written = 0;
    for id in delta {
        let commit = ctx.store.commit(id)?;
        let Some(issue_id) = issue_id_from_summary(&commit.summary) else {
            tracing::debug!("No issue id in issues branch commit {id}");
            continue;
        };
        if !seen.insert(issue_id.to_string()) {
            continue;
        }
        if reindex_issue(ctx.store, ctx.fields, writer, issue_id)? {
            written += 1;
        }
    }
    Ok(written)
}

/// Replace the document of one issue, or drop it when the issue is gone.
/// Returns whether a document was written.
pub fn reindex_issue(
    store: &dyn ObjectStore,
    fields: &super::schema::IndexSchema,
    writer: &IndexWriter,
    issue_id: &str,
) -> Result<bool> {
    delete_issue(writer, fields, issue_id)?;
    match store.issue(issue_id)? {
        Some(issue) => {
            writer.add_document(issue_document(fields, &issue))?;
            Ok(true)
        }
        None => Ok(false),
    }
}
