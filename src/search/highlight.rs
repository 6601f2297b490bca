use anyhow::Result;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::snippet::SnippetGenerator;
use tantivy::{Searcher, Term};

use super::composite::CompositeReader;
use super::policy::extension;
use crate::models::{Fragment, ObjectType};

/// Fragment length for commit messages.
pub const COMMIT_FRAGMENT_LEN: usize = 512;
/// Fragment length for file and issue content.
pub const FRAGMENT_LEN: usize = 150;
pub const MAX_FRAGMENTS: usize = 3;
/// Index terms a single wildcard may expand to for highlighting.
const MAX_WILDCARD_TERMS: usize = 64;

/// How matched terms are marked up in fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightMarkup {
    pub pre: String,
    pub post: String,
    /// Escape the fragment text for HTML before marking it up.
    pub escape_html: bool,
}

impl Default for HighlightMarkup {
    fn default() -> Self {
        Self {
            pre: r#"<span class="highlight">"#.to_string(),
            post: "</span>".to_string(),
            escape_html: true,
        }
    }
}

struct Generators {
    commit: SnippetGenerator,
    other: SnippetGenerator,
}

/// Extracts highlighted fragments of the content field for one executed
/// query, with one set of snippet generators per searched repository.
pub struct Highlighter<'m> {
    markup: &'m HighlightMarkup,
    generators: Vec<Generators>,
}

impl<'m> Highlighter<'m> {
    /// `wildcards` are the regex patterns of the query's wildcard terms; the
    /// index terms they match are highlighted alongside the query's own terms.
    pub fn new(
        reader: &CompositeReader,
        query: &dyn Query,
        wildcards: &[String],
        field: Field,
        markup: &'m HighlightMarkup,
    ) -> Result<Self> {
        let mut generators = Vec::with_capacity(reader.len());
        for source in 0..reader.len() {
            let searcher = reader.searcher(source);
            let expanded = expand_wildcards(searcher, field, wildcards)?;
            let highlight_query: Box<dyn Query> = if expanded.is_empty() {
                query.box_clone()
            } else {
                let mut clauses = vec![(Occur::Should, query.box_clone())];
                for term in expanded {
                    let term_query = TermQuery::new(term, IndexRecordOption::Basic);
                    clauses.push((Occur::Should, Box::new(term_query) as Box<dyn Query>));
                }
                Box::new(BooleanQuery::new(clauses))
            };
            let generator = |max_chars: usize| -> Result<SnippetGenerator> {
                let mut generator =
                    SnippetGenerator::create(searcher, highlight_query.as_ref(), field)?;
                generator.set_max_num_chars(max_chars);
                Ok(generator)
            };
            generators.push(Generators {
                commit: generator(COMMIT_FRAGMENT_LEN)?,
                other: generator(FRAGMENT_LEN)?,
            });
        }
        Ok(Self { markup, generators })
    }

    /// Up to [`MAX_FRAGMENTS`] distinct excerpts of `content`, a document of
    /// repository `source`, best first.
    ///
    /// Excerpts start at the beginning of a line. Blob excerpts carry their
    /// 1-based start line and the file's language hint. Without any match,
    /// blobs get no excerpt and other types get the clipped content.
    pub fn fragments(
        &self,
        source: usize,
        content: &str,
        object_type: ObjectType,
        path: Option<&str>,
    ) -> Vec<Fragment> {
        let limit = match object_type {
            ObjectType::Commit => COMMIT_FRAGMENT_LEN,
            _ => FRAGMENT_LEN,
        };
        let mut fragments = Vec::new();
        if let Some(generators) = self.generators.get(source) {
            let generator = match object_type {
                ObjectType::Commit => &generators.commit,
                _ => &generators.other,
            };
            fragments = self.extract(generator, content, object_type, path);
        }

        if fragments.is_empty() && object_type != ObjectType::Blob && !content.is_empty() {
            let clipped = &content[..floor_char_boundary(content, limit)];
            fragments.push(Fragment {
                text: format!("{}...", self.escape(clipped)),
                start_line: None,
                language: None,
            });
        }
        fragments
    }

    /// Each round takes the best snippet of the content left after the
    /// previous one.
    fn extract(
        &self,
        generator: &SnippetGenerator,
        content: &str,
        object_type: ObjectType,
        path: Option<&str>,
    ) -> Vec<Fragment> {
        let mut seen = HashSet::new();
        let mut fragments = Vec::new();
        let mut pos = 0;
        while fragments.len() < MAX_FRAGMENTS && pos < content.len() {
            let snippet = generator.snippet(&content[pos..]);
            let text = snippet.fragment();
            if snippet.highlighted().is_empty() || text.is_empty() {
                break;
            }
            let Some(found) = content[pos..].find(text) else {
                break;
            };
            let start = pos + found;
            let end = start + text.len();
            pos = end;

            let line_start = content[..start].rfind('\n').map_or(0, |i| i + 1);
            if !seen.insert(&content[line_start..end]) {
                continue;
            }
            let (start_line, language) = if object_type == ObjectType::Blob {
                let line = content[..line_start].matches('\n').count() + 1;
                (Some(line), path.and_then(extension))
            } else {
                (None, None)
            };
            let mut rendered = self.escape(&content[line_start..start]);
            rendered.push_str(&self.render(text, snippet.highlighted()));
            fragments.push(Fragment {
                text: rendered,
                start_line,
                language,
            });
        }
        fragments
    }

    fn render(&self, fragment: &str, highlighted: &[Range<usize>]) -> String {
        let mut out = String::new();
        let mut pos = 0;
        for range in highlighted {
            if range.start < pos {
                continue;
            }
            out.push_str(&self.escape(&fragment[pos..range.start]));
            out.push_str(&self.markup.pre);
            out.push_str(&self.escape(&fragment[range.clone()]));
            out.push_str(&self.markup.post);
            pos = range.end;
        }
        out.push_str(&self.escape(&fragment[pos..]));
        out
    }

    fn escape(&self, text: &str) -> String {
        if self.markup.escape_html {
            htmlescape::encode_minimal(text)
        } else {
            text.to_string()
        }
    }
}

/// Index terms of `field` in `searcher` matching any of the wildcard patterns.
fn expand_wildcards(searcher: &Searcher, field: Field, wildcards: &[String]) -> Result<Vec<Term>> {
    let mut terms = Vec::new();
    for pattern in wildcards {
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        let mut matched = BTreeSet::new();
        for segment in searcher.segment_readers() {
            let inverted = segment.inverted_index(field)?;
            let mut stream = inverted.terms().stream()?;
            while stream.advance() {
                if let Ok(text) = std::str::from_utf8(stream.key()) {
                    if re.is_match(text) {
                        matched.insert(text.to_string());
                    }
                }
            }
        }
        if matched.len() > MAX_WILDCARD_TERMS {
            tracing::debug!(
                "Highlighting {MAX_WILDCARD_TERMS} of {} terms for /{pattern}/",
                matched.len()
            );
        }
        terms.extend(
            matched
                .into_iter()
                .take(MAX_WILDCARD_TERMS)
                .map(|text| Term::from_field_text(field, &text)),
        );
    }
    Ok(terms)
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
