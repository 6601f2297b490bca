use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use super::INDEX_VERSION;

/// What a repository index was built from: the format version and the tip
/// each indexed branch had when it was last indexed.
///
/// Persisted as TOML:
///
/// ```toml
/// [index]
/// version = 1
///
/// [aliases]
/// <sha256 of branch name> = "refs/heads/master"
///
/// [branches]
/// <sha256 of branch name> = "<tip commit id>"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    index: IndexSection,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    #[serde(default)]
    branches: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct IndexSection {
    version: u32,
}

impl IndexState {
    /// Empty state stamped with the current format version.
    pub fn new() -> Self {
        Self {
            index: IndexSection {
                version: INDEX_VERSION,
            },
            ..Default::default()
        }
    }

    /// `Ok(None)` when no state file exists.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let state = toml::from_str(&data)
            .with_context(|| format!("Corrupt index state {}", path.display()))?;
        Ok(Some(state))
    }

    /// Atomic write via temp file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = toml::to_string_pretty(self).context("Failed to serialize index state")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.index.version
    }

    pub fn is_current(&self) -> bool {
        self.index.version == INDEX_VERSION
    }

    /// Last indexed tip of `branch`.
    pub fn tip(&self, branch: &str) -> Option<&str> {
        self.branches.get(&branch_key(branch)).map(String::as_str)
    }

    pub fn set_branch(&mut self, branch: &str, tip: &str) {
        let key = branch_key(branch);
        self.aliases.insert(key.clone(), branch.to_string());
        self.branches.insert(key, tip.to_string());
    }

    pub fn remove_branch(&mut self, branch: &str) {
        let key = branch_key(branch);
        self.aliases.remove(&key);
        self.branches.remove(&key);
    }

    /// Names of every branch with a recorded entry.
    pub fn branch_names(&self) -> Vec<String> {
        self.aliases.values().cloned().collect()
    }
}

/// Stable key for a branch name: hex SHA-256.
pub fn branch_key(branch: &str) -> String {
    hex::encode(Sha256::digest(branch.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_state_loads_as_none() {
        let dir = tempdir().unwrap();
        assert!(IndexState::load(&dir.path().join("state.toml"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("search-index/state.toml");

        let mut state = IndexState::new();
        state.set_branch("refs/heads/master", "abc123");
        state.set_branch("refs/heads/dev", "def456");
        state.save(&path).unwrap();

        let loaded = IndexState::load(&path).unwrap().unwrap();
        assert!(loaded.is_current());
        assert_eq!(loaded.tip("refs/heads/master"), Some("abc123"));
        assert_eq!(loaded.tip("refs/heads/dev"), Some("def456"));
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let mut state = IndexState::new();
        state.set_branch("refs/heads/master", "abc123");
        state.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let key = branch_key("refs/heads/master");
        assert!(text.contains("[index]"));
        assert!(text.contains(&format!("version = {INDEX_VERSION}")));
        assert!(text.contains(&format!("{key} = \"refs/heads/master\"")));
        assert!(text.contains(&format!("{key} = \"abc123\"")));
    }

    #[test]
    fn test_remove_branch() {
        let mut state = IndexState::new();
        state.set_branch("refs/heads/gone", "abc");
        state.remove_branch("refs/heads/gone");
        assert!(state.tip("refs/heads/gone").is_none());
        assert!(state.branch_names().is_empty());
    }

    #[test]
    fn test_outdated_version_is_not_current() {
        let state: IndexState = toml::from_str("[index]\nversion = 0\n").unwrap();
        assert!(!state.is_current());
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(IndexState::load(&path).is_err());
    }

    #[test]
    fn test_branch_key_is_hex_sha256() {
        let key = branch_key("refs/heads/master");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, branch_key("refs/heads/main"));
    }
}
