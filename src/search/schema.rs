use anyhow::{Context, Result};
use tantivy::schema::*;

/// Field handles of a repository index.
#[derive(Clone)]
pub struct IndexSchema {
    pub schema: Schema,
    pub object_type: Field,
    pub commit: Field,
    pub branch: Field,
    pub path: Field,
    /// Untokenized copy of `path` used for exact deletes
    pub path_key: Field,
    pub summary: Field,
    pub content: Field,
    pub author: Field,
    pub committer: Field,
    pub date: Field,
    pub tag: Field,
    pub label: Field,
    pub attachment: Field,
}

impl IndexSchema {
    pub fn build() -> Self {
        let mut builder = Schema::builder();
        let object_type = builder.add_text_field("type", STRING | STORED);
        let commit = builder.add_text_field("commit", STRING | STORED);
        let branch = builder.add_text_field("branch", STRING | STORED);
        let path = builder.add_text_field("path", TEXT | STORED);
        let path_key = builder.add_text_field("path_key", STRING);
        let summary = builder.add_text_field("summary", TEXT | STORED);
        let content = builder.add_text_field("content", TEXT | STORED);
        let author = builder.add_text_field("author", TEXT | STORED);
        let committer = builder.add_text_field("committer", TEXT | STORED);
        let date =
            builder.add_date_field("date", DateOptions::default().set_stored().set_indexed());
        let tag = builder.add_text_field("tag", TEXT | STORED);
        let label = builder.add_text_field("label", TEXT | STORED);
        let attachment = builder.add_text_field("attachment", TEXT | STORED);

        Self {
            schema: builder.build(),
            object_type,
            commit,
            branch,
            path,
            path_key,
            summary,
            content,
            author,
            committer,
            date,
            tag,
            label,
            attachment,
        }
    }

    /// Look up the field handles in the schema of an existing index.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .with_context(|| format!("Index schema has no `{name}` field"))
        };
        Ok(Self {
            schema: schema.clone(),
            object_type: field("type")?,
            commit: field("commit")?,
            branch: field("branch")?,
            path: field("path")?,
            path_key: field("path_key")?,
            summary: field("summary")?,
            content: field("content")?,
            author: field("author")?,
            committer: field("committer")?,
            date: field("date")?,
            tag: field("tag")?,
            label: field("label")?,
            attachment: field("attachment")?,
        })
    }
}
