use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Folder holding the git repositories to index
    pub repositories_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Master switch for the periodic maintenance cycle
    pub indexing_enabled: bool,
    /// Seconds between maintenance cycles
    pub index_interval_secs: u64,
    /// Branches indexed when a repository does not choose its own
    pub default_indexed_branches: Vec<String>,
    /// Page size used when a search request does not ask for one
    pub default_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repositories_dir: PathBuf::from("./repositories"),
            bind_addr: "127.0.0.1:9000".to_string(),
            indexing_enabled: true,
            index_interval_secs: 120,
            default_indexed_branches: vec!["default".to_string()],
            default_page_size: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("REPO_SEARCH_REPOSITORIES_DIR") {
            config.repositories_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REPO_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(val) = std::env::var("REPO_SEARCH_INDEXING_ENABLED") {
            config.indexing_enabled = parse_bool(&val).unwrap_or(config.indexing_enabled);
        }
        if let Ok(val) = std::env::var("REPO_SEARCH_INDEX_INTERVAL_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.index_interval_secs = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("REPO_SEARCH_INDEXED_BRANCHES") {
            let branches = split_list(&val);
            if !branches.is_empty() {
                config.default_indexed_branches = branches;
            }
        }
        if let Ok(val) = std::env::var("REPO_SEARCH_PAGE_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.default_page_size = v.max(1);
            }
        }

        config
    }
}

/// Split a comma and/or whitespace separated setting into its values.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_accepts_commas_and_spaces() {
        assert_eq!(
            split_list("default, refs/heads/dev  release"),
            vec!["default", "refs/heads/dev", "release"]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_default_indexes_default_branch() {
        let config = Config::default();
        assert_eq!(config.default_indexed_branches, vec!["default"]);
        assert!(config.indexing_enabled);
    }
}
