use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tantivy::Index;

use super::schema::IndexSchema;
use super::state::IndexState;

const INDEX_DIR: &str = "search-index";
const STATE_FILE: &str = "state.toml";
const SEGMENTS_DIR: &str = "segments";

/// Where a repository keeps its index: `<git dir>/search-index/`, holding
/// `state.toml` and the tantivy segments under `segments/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLocation {
    root: PathBuf,
}

impl IndexLocation {
    pub fn for_git_dir(git_dir: &Path) -> Self {
        Self {
            root: git_dir.join(INDEX_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR)
    }

    /// True only for an index stamped with the current format version.
    pub fn has_index(&self) -> bool {
        match IndexState::load(&self.state_path()) {
            Ok(Some(state)) => {
                state.is_current() && self.segments_dir().join("meta.json").exists()
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Ignoring unreadable index state: {e:#}");
                false
            }
        }
    }

    /// The saved state, or a fresh current-version state when none exists.
    pub fn load_state(&self) -> Result<IndexState> {
        Ok(IndexState::load(&self.state_path())?.unwrap_or_else(IndexState::new))
    }

    /// Open the tantivy index, creating an empty one when none exists.
    pub fn open_or_create(&self) -> Result<(Index, IndexSchema)> {
        let dir = self.segments_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        if dir.join("meta.json").exists() {
            let index = Index::open_in_dir(&dir).context("Failed to open existing tantivy index")?;
            let fields = IndexSchema::from_schema(&index.schema())?;
            Ok((index, fields))
        } else {
            let fields = IndexSchema::build();
            let index = Index::create_in_dir(&dir, fields.schema.clone())
                .context("Failed to create tantivy index")?;
            Ok((index, fields))
        }
    }

    /// Remove the index and its state.
    ///
    /// The directory is first renamed out of the way, so a failure leaves the
    /// old index untouched. Returns `false` when there was nothing to delete.
    pub fn delete(&self) -> Result<bool> {
        if !self.root.exists() {
            return Ok(false);
        }
        let tombstone = self.tombstone_path();
        std::fs::rename(&self.root, &tombstone).with_context(|| {
            format!("Failed to move {} out of the way", self.root.display())
        })?;
        if let Err(e) = std::fs::remove_dir_all(&tombstone) {
            tracing::warn!("Failed to remove {}: {e}", tombstone.display());
        }
        Ok(true)
    }

    fn tombstone_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        self.root
            .with_file_name(format!("{INDEX_DIR}.deleted-{}-{nanos}", std::process::id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::INDEX_VERSION;
    use tempfile::tempdir;

    #[test]
    fn test_layout() {
        let location = IndexLocation::for_git_dir(Path::new("/srv/git/app.git"));
        assert_eq!(
            location.state_path(),
            Path::new("/srv/git/app.git/search-index/state.toml")
        );
        assert_eq!(
            location.segments_dir(),
            Path::new("/srv/git/app.git/search-index/segments")
        );
    }

    #[test]
    fn test_has_index_requires_current_state_and_segments() {
        let dir = tempdir().unwrap();
        let location = IndexLocation::for_git_dir(dir.path());
        assert!(!location.has_index());

        location.open_or_create().unwrap();
        assert!(!location.has_index(), "segments without state");

        IndexState::new().save(&location.state_path()).unwrap();
        assert!(location.has_index());

        std::fs::write(
            location.state_path(),
            format!("[index]\nversion = {}\n", INDEX_VERSION + 1),
        )
        .unwrap();
        assert!(!location.has_index(), "foreign version");
    }

    #[test]
    fn test_missing_state_loads_as_current() {
        let dir = tempdir().unwrap();
        let location = IndexLocation::for_git_dir(dir.path());
        let state = location.load_state().unwrap();
        assert!(state.is_current());
        assert!(state.branch_names().is_empty());
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = tempdir().unwrap();
        let location = IndexLocation::for_git_dir(dir.path());
        let (_, created) = location.open_or_create().unwrap();
        let (_, reopened) = location.open_or_create().unwrap();
        assert_eq!(created.summary, reopened.summary);
    }

    #[test]
    fn test_delete_removes_everything() {
        let dir = tempdir().unwrap();
        let location = IndexLocation::for_git_dir(dir.path());
        assert!(!location.delete().unwrap());

        location.open_or_create().unwrap();
        IndexState::new().save(&location.state_path()).unwrap();
        assert!(location.delete().unwrap());
        assert!(!location.root().exists());
        assert!(!location.has_index());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
