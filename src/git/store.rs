use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use git2::{
    BranchType, Delta, DiffFile, DiffFindOptions, DiffOptions, ErrorCode, FileMode, ObjectType,
    Oid, Repository, Signature, Sort, Tree, TreeWalkMode, TreeWalkResult,
};
use std::collections::BTreeMap;
use std::path::Path;

use super::{
    BranchRef, ChangeKind, CommitInfo, Identity, ObjectStore, PathChange, TagRef, ISSUES_BRANCH,
};
use crate::config::split_list;
use crate::models::Issue;

/// Git config key a repository may set to choose its indexed branches.
const INDEXED_BRANCHES_KEY: &str = "search.indexedBranches";

/// [`ObjectStore`] over a repository opened with libgit2.
pub struct GitObjectStore {
    repo: Repository,
}

impl GitObjectStore {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open repository {}", path.display()))?;
        Ok(Self { repo })
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    /// The `.git` directory, or the repository itself when bare.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Branches chosen through `search.indexedBranches`, if the repository sets it.
    pub fn configured_branches(&self) -> Result<Option<Vec<String>>> {
        let config = self.repo.config().context("Failed to read repository config")?;
        match config.get_string(INDEXED_BRANCHES_KEY) {
            Ok(value) => Ok(Some(split_list(&value))),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read indexed branches"),
        }
    }

    fn read_issue(&self, tree: &Tree<'_>, id: &str) -> Result<Option<Issue>> {
        let entry = match tree.get_path(&Path::new(id).join("issue.json")) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to look up issue {id}")),
        };
        let blob = entry
            .to_object(&self.repo)
            .and_then(|o| o.peel_to_blob())
            .with_context(|| format!("Failed to read issue {id}"))?;
        let issue = serde_json::from_slice(blob.content())
            .with_context(|| format!("Malformed issue record {id}"))?;
        Ok(Some(issue))
    }

    fn issues_tree(&self) -> Result<Option<Tree<'_>>> {
        let Some(branch) = self.issues_branch()? else {
            return Ok(None);
        };
        let tree = self.repo.find_commit(oid(&branch.tip)?)?.tree()?;
        Ok(Some(tree))
    }
}

impl ObjectStore for GitObjectStore {
    fn default_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.find_reference("HEAD") {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read HEAD"),
        };
        if let Some(target) = head.symbolic_target() {
            // unborn HEAD has nothing behind it
            return Ok(self
                .repo
                .find_reference(target)
                .ok()
                .map(|_| target.to_string()));
        }
        // detached HEAD: pick the branch sitting on the same commit
        let Some(head_id) = head.target() else {
            return Ok(None);
        };
        let head_id = head_id.to_string();
        Ok(self
            .local_branches()?
            .into_iter()
            .find(|b| b.tip == head_id)
            .map(|b| b.name))
    }

    fn local_branches(&self) -> Result<Vec<BranchRef>> {
        let mut branches = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            let reference = branch.get();
            let Some(name) = reference.name() else {
                continue;
            };
            let commit = match reference.peel_to_commit() {
                Ok(commit) => commit,
                Err(e) => {
                    tracing::warn!("Skipping branch {name}: {e}");
                    continue;
                }
            };
            branches.push(BranchRef {
                name: name.to_string(),
                tip: commit.id().to_string(),
                date: git_time(commit.time()),
            });
        }
        Ok(branches)
    }

    fn annotated_tags(&self) -> Result<Vec<TagRef>> {
        let mut refs = Vec::new();
        self.repo.tag_foreach(|id, name| {
            refs.push((id, String::from_utf8_lossy(name).to_string()));
            true
        })?;

        let mut tags = Vec::new();
        for (id, name) in refs {
            // lightweight tags point straight at a commit
            let Ok(tag) = self.repo.find_tag(id) else {
                continue;
            };
            let target = match tag.target().and_then(|o| o.peel_to_commit()) {
                Ok(commit) => commit.id().to_string(),
                Err(_) => continue,
            };
            tags.push(TagRef {
                name: name.strip_prefix("refs/tags/").unwrap_or(&name).to_string(),
                target,
            });
        }
        Ok(tags)
    }

    fn issues_branch(&self) -> Result<Option<BranchRef>> {
        let reference = match self.repo.find_reference(ISSUES_BRANCH) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to resolve issues branch"),
        };
        let commit = reference.peel_to_commit()?;
        Ok(Some(BranchRef {
            name: ISSUES_BRANCH.to_string(),
            tip: commit.id().to_string(),
            date: git_time(commit.time()),
        }))
    }

    fn issues(&self) -> Result<Vec<Issue>> {
        let Some(tree) = self.issues_tree()? else {
            return Ok(Vec::new());
        };
        let mut issues = Vec::new();
        for entry in tree.iter() {
            if entry.kind() != Some(ObjectType::Tree) {
                continue;
            }
            let Some(id) = entry.name() else {
                continue;
            };
            match self.read_issue(&tree, id) {
                Ok(Some(issue)) => issues.push(issue),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping issue {id}: {e:#}"),
            }
        }
        Ok(issues)
    }

    fn issue(&self, id: &str) -> Result<Option<Issue>> {
        if id.is_empty() {
            return Ok(None);
        }
        match self.issues_tree()? {
            Some(tree) => self.read_issue(&tree, id),
            None => Ok(None),
        }
    }

    fn tree_files(&self, commit_id: &str) -> Result<BTreeMap<String, String>> {
        let tree = self
            .repo
            .find_commit(oid(commit_id)?)
            .and_then(|c| c.tree())
            .with_context(|| format!("Failed to read tree of {commit_id}"))?;

        let mut files = BTreeMap::new();
        // submodules show up as commit entries and are left out
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.insert(format!("{root}{name}"), entry.id().to_string());
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }

    fn commit(&self, commit_id: &str) -> Result<CommitInfo> {
        let commit = self
            .repo
            .find_commit(oid(commit_id)?)
            .with_context(|| format!("Failed to read commit {commit_id}"))?;
        let info = CommitInfo {
            id: commit.id().to_string(),
            parents: commit.parent_ids().map(|p| p.to_string()).collect(),
            author: identity(&commit.author()),
            committer: identity(&commit.committer()),
            time: git_time(commit.time()),
            summary: commit.summary().unwrap_or_default().to_string(),
            message: commit.message().unwrap_or_default().to_string(),
        };
        Ok(info)
    }

    fn history(&self, tip: &str) -> Result<Vec<String>> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(oid(tip)?)?;
        walk.map(|id| -> Result<String> { Ok(id?.to_string()) })
            .collect()
    }

    fn history_since(&self, since: &str, tip: &str) -> Result<Vec<String>> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(oid(tip)?)?;
        walk.hide(oid(since)?)
            .with_context(|| format!("Previously indexed commit {since} is gone"))?;
        walk.map(|id| -> Result<String> { Ok(id?.to_string()) })
            .collect()
    }

    fn changed_paths(&self, commit: &CommitInfo) -> Result<Vec<PathChange>> {
        let current = self.repo.find_commit(oid(&commit.id)?)?;
        let new_tree = current.tree()?;
        let old_tree = match current.parent_ids().next() {
            Some(parent) => Some(self.repo.find_commit(parent)?.tree()?),
            None => None,
        };

        let mut opts = DiffOptions::new();
        opts.include_typechange(true);
        let mut diff =
            self.repo
                .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut opts))?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let old_file = delta.old_file();
            let new_file = delta.new_file();
            if old_file.mode() == FileMode::Commit || new_file.mode() == FileMode::Commit {
                continue;
            }
            let kind = match delta.status() {
                Delta::Added => ChangeKind::Added,
                Delta::Deleted => ChangeKind::Deleted,
                Delta::Modified | Delta::Typechange => ChangeKind::Modified,
                Delta::Renamed => ChangeKind::Renamed,
                Delta::Copied => ChangeKind::Copied,
                _ => continue,
            };
            let change = if kind == ChangeKind::Deleted {
                let Some(path) = file_path(&old_file) else {
                    continue;
                };
                PathChange {
                    path,
                    old_path: None,
                    kind,
                    blob_id: None,
                }
            } else {
                let Some(path) = file_path(&new_file) else {
                    continue;
                };
                PathChange {
                    path,
                    old_path: if kind == ChangeKind::Renamed {
                        file_path(&old_file)
                    } else {
                        None
                    },
                    kind,
                    blob_id: Some(new_file.id().to_string()),
                }
            };
            changes.push(change);
        }
        Ok(changes)
    }

    fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>> {
        let blob = self
            .repo
            .find_blob(oid(blob_id)?)
            .with_context(|| format!("Failed to read blob {blob_id}"))?;
        Ok(blob.content().to_vec())
    }
}

fn oid(id: &str) -> Result<Oid> {
    Oid::from_str(id).with_context(|| format!("Invalid object id {id}"))
}

fn git_time(time: git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

fn identity(signature: &Signature<'_>) -> Identity {
    Identity {
        name: signature.name().unwrap_or_default().to_string(),
        email: signature.email().unwrap_or_default().to_string(),
    }
}

fn file_path(file: &DiffFile<'_>) -> Option<String> {
    file.path()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}
