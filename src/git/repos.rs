use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::GitObjectStore;
use crate::models::RepositoryModel;

/// Find every git repository below `root`, bare or not.
///
/// Names are paths relative to `root` with `/` separators. A repository's
/// own `search.indexedBranches` setting wins over `default_branches`.
pub fn discover_repositories(root: &Path, default_branches: &[String]) -> Vec<RepositoryModel> {
    let mut repos = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if is_hidden(&entry) {
            walker.skip_current_dir();
            continue;
        }
        if !is_repository(entry.path()) {
            continue;
        }
        walker.skip_current_dir();

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative.to_string_lossy().replace('\\', "/");
        let branches = match GitObjectStore::open(entry.path()).and_then(|s| s.configured_branches()) {
            Ok(Some(branches)) => branches,
            Ok(None) => default_branches.to_vec(),
            Err(e) => {
                tracing::warn!("Skipping repository {name}: {e:#}");
                continue;
            }
        };
        repos.push(RepositoryModel::new(name, branches));
    }

    repos.sort_by(|a, b| a.name.cmp(&b.name));
    repos
}

/// Directory holding the git data of repository `name`: its `.git`
/// folder when it has a work tree, the repository folder otherwise.
pub fn resolve_git_dir(root: &Path, name: &str) -> PathBuf {
    let repo_dir = root.join(name);
    let dot_git = repo_dir.join(".git");
    if dot_git.is_dir() {
        dot_git
    } else {
        repo_dir
    }
}

fn is_repository(path: &Path) -> bool {
    path.join(".git").is_dir()
        || (path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
