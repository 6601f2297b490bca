use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The kinds of objects stored in a repository index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit,
    Blob,
    Issue,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Blob => "blob",
            ObjectType::Issue => "issue",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "commit" => Some(ObjectType::Commit),
            "blob" => Some(ObjectType::Blob),
            "issue" => Some(ObjectType::Issue),
            _ => None,
        }
    }
}

/// A repository known to the search engine, with the branches it wants indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryModel {
    pub name: String,
    /// Branch names (`refs/heads/x` or `x`); the entry `default` selects
    /// whatever branch HEAD points at.
    pub indexed_branches: Vec<String>,
}

impl RepositoryModel {
    pub fn new(name: impl Into<String>, indexed_branches: Vec<String>) -> Self {
        Self {
            name: name.into(),
            indexed_branches,
        }
    }

    pub fn has_indexed_branches(&self) -> bool {
        !self.indexed_branches.is_empty()
    }
}

/// Entry of `GET /api/repos`.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStatus {
    pub name: String,
    pub indexed_branches: Vec<String>,
    pub has_index: bool,
}

/// An issue stored on a repository's issues branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: String,
    pub reporter: String,
    pub created: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub author: String,
    pub created: DateTime<Utc>,
    pub text: String,
}

impl Issue {
    /// The searchable body of the issue: header, description and comment trail.
    pub fn full_text(&self) -> String {
        let short_id: String = self.id.chars().take(8).collect();
        let mut text = format!("issue {short_id} ({})\n", self.summary);
        if !self.description.is_empty() {
            text.push_str(&self.description);
            text.push('\n');
        }
        for comment in &self.comments {
            text.push_str(&format!(
                "{} {}: {}\n",
                comment.created.format("%Y-%m-%d %H:%M"),
                comment.author,
                comment.text
            ));
        }
        text
    }

    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments
            .iter()
            .map(|a| a.name.to_lowercase())
            .collect()
    }
}

/// One highlighted excerpt of a hit's content.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fragment {
    /// Excerpt text with the caller's highlight markup applied.
    pub text: String,
    /// 1-based line the excerpt starts on (blob hits only).
    pub start_line: Option<usize>,
    /// Extension-derived language hint (blob hits only).
    pub language: Option<String>,
}

/// A ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// 1-based rank across all pages
    pub hit_id: usize,
    pub total_hits: usize,
    pub score: f32,
    pub date: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub committer: Option<String>,
    pub object_type: ObjectType,
    pub branch: Option<String>,
    /// Commit id for commit/blob hits, issue id for issue hits
    pub commit_id: Option<String>,
    pub path: Option<String>,
    pub tags: Vec<String>,
    pub labels: Vec<String>,
    pub repository: String,
    pub fragments: Vec<Fragment>,
}

/// Counters for one reindex or update run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    pub success: bool,
    pub branch_count: usize,
    pub commit_count: usize,
    pub blob_count: usize,
    pub issue_count: usize,
    pub duration: Duration,
    #[serde(skip)]
    started: Instant,
}

impl IndexResult {
    pub fn start() -> Self {
        Self {
            success: false,
            branch_count: 0,
            commit_count: 0,
            blob_count: 0,
            issue_count: 0,
            duration: Duration::ZERO,
            started: Instant::now(),
        }
    }

    pub fn add(&mut self, other: &IndexResult) {
        self.branch_count += other.branch_count;
        self.commit_count += other.commit_count;
        self.blob_count += other.blob_count;
        self.issue_count += other.issue_count;
    }

    pub fn succeed(mut self) -> Self {
        self.success = true;
        self.duration = self.started.elapsed();
        self
    }

    pub fn fail(mut self) -> Self {
        self.success = false;
        self.duration = self.started.elapsed();
        self
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration.as_secs_f32()
    }
}

/// Query string of `GET /api/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    pub page_size: Option<usize>,
    /// Comma separated repository names
    pub repos: String,
}

fn default_page() -> usize {
    1
}

impl SearchRequest {
    pub fn repositories(&self) -> Vec<String> {
        self.repos
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub page: usize,
    pub page_size: usize,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_type_names_round_trip() {
        for t in [ObjectType::Commit, ObjectType::Blob, ObjectType::Issue] {
            assert_eq!(ObjectType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(ObjectType::from_name("tree"), None);
    }

    #[test]
    fn test_object_type_serializes_to_snake_case() {
        let json = serde_json::to_value(ObjectType::Blob).unwrap();
        assert_eq!(json, "blob");
    }

    #[test]
    fn test_issue_full_text_includes_comments() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let issue = Issue {
            id: "0123456789abcdef".to_string(),
            reporter: "alice".to_string(),
            created,
            summary: "Crash on start".to_string(),
            description: "Segfault in the loader".to_string(),
            labels: vec!["bug".to_string()],
            attachments: vec![Attachment {
                name: "Trace.LOG".to_string(),
                size: 10,
            }],
            comments: vec![Comment {
                author: "bob".to_string(),
                created,
                text: "Reproduced".to_string(),
            }],
        };
        let text = issue.full_text();
        assert!(text.starts_with("issue 01234567 (Crash on start)\n"));
        assert!(text.contains("Segfault in the loader"));
        assert!(text.contains("bob: Reproduced"));
        assert_eq!(issue.attachment_names(), vec!["trace.log".to_string()]);
    }

    #[test]
    fn test_issue_json_defaults_optional_fields() {
        let json = r#"{"id":"42","reporter":"r","created":"2024-01-01T00:00:00Z","summary":"s"}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.labels.is_empty());
        assert!(issue.comments.is_empty());
    }

    #[test]
    fn test_index_result_accumulates() {
        let mut total = IndexResult::start();
        let mut part = IndexResult::start();
        part.commit_count = 3;
        part.blob_count = 2;
        total.add(&part);
        total.add(&part);
        let total = total.succeed();
        assert!(total.success);
        assert_eq!(total.commit_count, 6);
        assert_eq!(total.blob_count, 4);
    }

    #[test]
    fn test_search_request_splits_repositories() {
        let req = SearchRequest {
            q: "x".to_string(),
            page: 1,
            page_size: None,
            repos: "a.git, b.git,,".to_string(),
        };
        assert_eq!(req.repositories(), vec!["a.git", "b.git"]);
    }
}
