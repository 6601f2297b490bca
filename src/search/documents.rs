use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tantivy::query::{BooleanQuery, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, TantivyDocument};
use tantivy::{IndexWriter, Term};

use super::policy::IndexPolicy;
use super::schema::IndexSchema;
use crate::git::{CommitInfo, ObjectStore, ISSUES_BRANCH};
use crate::models::{Issue, ObjectType};

/// Dates are indexed at minute resolution.
pub fn index_date(time: DateTime<Utc>) -> tantivy::DateTime {
    let secs = time.timestamp();
    tantivy::DateTime::from_timestamp_secs(secs - secs.rem_euclid(60))
}

pub fn commit_document(
    fields: &IndexSchema,
    commit: &CommitInfo,
    branch: &str,
    tags: &[String],
) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(fields.object_type, ObjectType::Commit.as_str());
    doc.add_text(fields.commit, &commit.id);
    doc.add_text(fields.branch, branch);
    doc.add_text(fields.author, commit.author.display_name());
    doc.add_text(fields.committer, commit.committer.display_name());
    doc.add_date(fields.date, index_date(commit.time));
    doc.add_text(fields.summary, &commit.summary);
    doc.add_text(fields.content, &commit.message);
    for tag in tags {
        doc.add_text(fields.tag, tag);
    }
    doc
}

/// A file at a branch tip, attributed to the commit that last changed it.
/// `content` is `None` for excluded or undecodable files.
pub fn blob_document(
    fields: &IndexSchema,
    branch: &str,
    path: &str,
    commit: &CommitInfo,
    content: Option<&str>,
) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(fields.object_type, ObjectType::Blob.as_str());
    doc.add_text(fields.commit, &commit.id);
    doc.add_text(fields.branch, branch);
    doc.add_text(fields.path, path);
    doc.add_text(fields.path_key, path);
    doc.add_text(fields.author, commit.author.display_name());
    doc.add_text(fields.committer, commit.committer.display_name());
    doc.add_date(fields.date, index_date(commit.time));
    if let Some(content) = content {
        doc.add_text(fields.content, content);
    }
    doc
}

pub fn issue_document(fields: &IndexSchema, issue: &Issue) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(fields.object_type, ObjectType::Issue.as_str());
    doc.add_text(fields.commit, &issue.id);
    doc.add_text(fields.branch, ISSUES_BRANCH);
    doc.add_text(fields.author, &issue.reporter);
    doc.add_date(fields.date, index_date(issue.created));
    doc.add_text(fields.summary, &issue.summary);
    doc.add_text(fields.content, issue.full_text());
    for label in &issue.labels {
        doc.add_text(fields.label, label);
    }
    for name in issue.attachment_names() {
        doc.add_text(fields.attachment, name);
    }
    doc
}

/// Decoded content of a blob, or `None` when policy or decoding rules it out.
/// Read failures are logged; the document is still indexed without content.
pub fn blob_content(
    store: &dyn ObjectStore,
    policy: &IndexPolicy,
    path: &str,
    blob_id: &str,
) -> Option<String> {
    if policy.is_excluded(path) {
        return None;
    }
    match store.read_blob(blob_id) {
        Ok(bytes) => {
            let text = policy.decode(&bytes);
            if text.is_none() {
                tracing::debug!("Indexing {path} without content: not decodable text");
            }
            text
        }
        Err(e) => {
            tracing::warn!("Indexing {path} without content: {e:#}");
            None
        }
    }
}

fn term_query(field: tantivy::schema::Field, value: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, value),
        IndexRecordOption::Basic,
    ))
}

/// Delete the blob document for `path` on `branch`.
pub fn delete_blob(
    writer: &IndexWriter,
    fields: &IndexSchema,
    branch: &str,
    path: &str,
) -> Result<()> {
    let query = BooleanQuery::intersection(vec![
        term_query(fields.object_type, ObjectType::Blob.as_str()),
        term_query(fields.branch, branch),
        term_query(fields.path_key, path),
    ]);
    writer
        .delete_query(Box::new(query))
        .with_context(|| format!("Failed to delete {path} on {branch}"))?;
    Ok(())
}

pub fn delete_issue(writer: &IndexWriter, fields: &IndexSchema, issue_id: &str) -> Result<()> {
    let query = BooleanQuery::intersection(vec![
        term_query(fields.object_type, ObjectType::Issue.as_str()),
        term_query(fields.commit, issue_id),
    ]);
    writer
        .delete_query(Box::new(query))
        .with_context(|| format!("Failed to delete issue {issue_id}"))?;
    Ok(())
}

/// Delete every document tagged with `branch`.
pub fn delete_branch(writer: &IndexWriter, fields: &IndexSchema, branch: &str) {
    writer.delete_term(Term::from_field_text(fields.branch, branch));
}
