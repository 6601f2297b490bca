//! Read access to repository history: the narrow interface the indexer
//! consumes, and its libgit2 implementation.

pub mod repos;
pub mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::Issue;

pub use repos::discover_repositories;
pub use store::GitObjectStore;

/// Branch holding the issue tracker records.
pub const ISSUES_BRANCH: &str = "refs/heads/_issues";

/// A local branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    /// Fully qualified name, e.g. `refs/heads/master`
    pub name: String,
    pub tip: String,
    /// Commit time of the tip
    pub date: DateTime<Utc>,
}

impl BranchRef {
    pub fn short_name(&self) -> &str {
        self.name.strip_prefix("refs/heads/").unwrap_or(&self.name)
    }
}

/// An annotated tag peeled to the commit it labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Display name without `refs/tags/`
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Name, falling back to the email address, then to `unknown`.
    pub fn display_name(&self) -> String {
        if !self.name.trim().is_empty() {
            self.name.clone()
        } else if !self.email.trim().is_empty() {
            self.email.clone()
        } else {
            "unknown".to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub parents: Vec<String>,
    pub author: Identity,
    pub committer: Identity,
    /// Commit time (committer clock)
    pub time: DateTime<Utc>,
    /// First line of the message
    pub summary: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

/// One path touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    /// Path after the change (the deleted path for deletions)
    pub path: String,
    /// Source path of a rename
    pub old_path: Option<String>,
    pub kind: ChangeKind,
    /// Blob id after the change; `None` for deletions
    pub blob_id: Option<String>,
}

impl PathChange {
    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }
}

/// Everything the indexer needs to know about a repository's objects.
///
/// Object ids cross this boundary as lowercase hex strings.
pub trait ObjectStore {
    /// Full name of the branch HEAD resolves to, if any.
    fn default_branch(&self) -> Result<Option<String>>;

    fn local_branches(&self) -> Result<Vec<BranchRef>>;

    /// Annotated tags only; lightweight tags are not reported.
    fn annotated_tags(&self) -> Result<Vec<TagRef>>;

    fn issues_branch(&self) -> Result<Option<BranchRef>>;

    fn issues(&self) -> Result<Vec<Issue>>;

    /// `Ok(None)` when the issue does not exist (or was deleted).
    fn issue(&self, id: &str) -> Result<Option<Issue>>;

    /// Every file path at `commit_id` mapped to its blob id, submodules excluded.
    fn tree_files(&self, commit_id: &str) -> Result<BTreeMap<String, String>>;

    fn commit(&self, commit_id: &str) -> Result<CommitInfo>;

    /// Commits reachable from `tip`, newest first.
    fn history(&self, tip: &str) -> Result<Vec<String>>;

    /// Commits reachable from `tip` but not from `since`, newest first.
    fn history_since(&self, since: &str, tip: &str) -> Result<Vec<String>>;

    /// Paths changed by `commit` against its first parent, or against the
    /// empty tree for a root commit. Submodule entries are skipped.
    fn changed_paths(&self, commit: &CommitInfo) -> Result<Vec<PathChange>>;

    fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>>;
}

/// Issue id carried by a commit on the issues branch (`"<op> <id>"`).
pub fn issue_id_from_summary(summary: &str) -> Option<&str> {
    let (_, id) = summary.trim().split_once(' ')?;
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
