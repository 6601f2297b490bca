use anyhow::{bail, Context, Result};
use chrono::DateTime;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, RegexQuery};
use tantivy::schema::{Field, TantivyDocument, Value};
use tantivy::{DocAddress, Index};

use super::composite::CompositeReader;
use super::highlight::Highlighter;
use super::schema::IndexSchema;
use super::MAX_HITS;
use crate::models::{ObjectType, SearchResult};

/// One ranked document of a (possibly multi-repository) query.
#[derive(Debug, Clone, Copy)]
pub struct RankedHit {
    pub source: usize,
    pub address: DocAddress,
    pub score: f32,
}

/// Parse free text into a query over the summary and content fields.
///
/// Terms containing `*` or `?` become regex term queries, which lets them
/// start with a wildcard; everything else goes through the query parser.
/// All parts are OR-ed together.
pub fn build_query(index: &Index, fields: &IndexSchema, text: &str) -> Result<Box<dyn Query>> {
    let mut parsed_tokens = Vec::new();
    let mut wildcards = Vec::new();
    for token in tokenize(text) {
        if is_wildcard(&token) {
            wildcards.push(token.trim_start_matches('+').to_string());
        } else {
            parsed_tokens.push(token);
        }
    }
    let remainder = drop_dangling_operators(parsed_tokens).join(" ");

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    if !remainder.is_empty() {
        let parser = QueryParser::for_index(index, vec![fields.summary, fields.content]);
        let parsed = parser
            .parse_query(&remainder)
            .with_context(|| format!("Malformed query {text:?}"))?;
        clauses.push((Occur::Should, parsed));
    }
    for token in &wildcards {
        let pattern = wildcard_pattern(token);
        tracing::debug!("Wildcard term {token} searched as /{pattern}/");
        for field in [fields.summary, fields.content] {
            let query = RegexQuery::from_pattern(&pattern, field)
                .with_context(|| format!("Malformed wildcard {token:?}"))?;
            clauses.push((Occur::Should, Box::new(query)));
        }
    }

    match clauses.len() {
        0 => bail!("Query {text:?} has no search terms"),
        1 => Ok(clauses.remove(0).1),
        _ => Ok(Box::new(BooleanQuery::new(clauses))),
    }
}

/// Run `query` over every source of `reader`.
///
/// Returns the total match count and the best [`MAX_HITS`] hits ranked by
/// score, ties broken by global document id.
pub fn execute(reader: &CompositeReader, query: &dyn Query) -> Result<(usize, Vec<RankedHit>)> {
    let collector = (TopDocs::with_limit(MAX_HITS), Count);

    if reader.len() == 1 {
        let (top, total) = reader
            .searcher(0)
            .search(query, &collector)
            .context("Search failed")?;
        let hits = top
            .into_iter()
            .map(|(score, address)| RankedHit {
                source: 0,
                address,
                score,
            })
            .collect();
        return Ok((total, hits));
    }

    let mut total = 0;
    let mut ranked = Vec::new();
    for source in 0..reader.len() {
        let (top, count) = reader
            .searcher(source)
            .search_with_statistics_provider(query, &collector, reader)
            .with_context(|| format!("Search of {} failed", reader.repository(source)))?;
        total += count;
        ranked.extend(
            top.into_iter()
                .map(|(score, address)| (reader.global_id(source, address), score)),
        );
    }
    ranked.sort_by(|(ga, a), (gb, b)| b.total_cmp(a).then(ga.cmp(gb)));
    ranked.truncate(MAX_HITS);
    let hits = ranked
        .into_iter()
        .filter_map(|(global, score)| {
            let (source, address) = reader.resolve(global)?;
            Some(RankedHit {
                source,
                address,
                score,
            })
        })
        .collect();
    Ok((total, hits))
}

/// Turn a stored document into a search result.
pub fn to_result(
    fields: &IndexSchema,
    doc: &TantivyDocument,
    repository: &str,
    hit: &RankedHit,
    hit_id: usize,
    total_hits: usize,
    highlighter: &Highlighter<'_>,
) -> SearchResult {
    let text = |field: Field| {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let all = |field: Field| -> Vec<String> {
        doc.get_all(field)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()
    };

    let object_type = text(fields.object_type)
        .and_then(|t| ObjectType::from_name(&t))
        .unwrap_or(ObjectType::Commit);
    let path = text(fields.path);
    let content = text(fields.content).unwrap_or_default();
    let fragments = highlighter.fragments(hit.source, &content, object_type, path.as_deref());

    SearchResult {
        hit_id,
        total_hits,
        score: hit.score,
        date: doc
            .get_first(fields.date)
            .and_then(|v| v.as_datetime())
            .and_then(|d| DateTime::from_timestamp(d.into_timestamp_secs(), 0)),
        summary: text(fields.summary),
        author: text(fields.author),
        committer: text(fields.committer),
        object_type,
        branch: text(fields.branch),
        commit_id: text(fields.commit),
        path,
        tags: all(fields.tag),
        labels: all(fields.label),
        repository: repository.to_string(),
        fragments,
    }
}

/// Regex patterns of the wildcard terms in `text`, as searched by
/// [`build_query`].
pub fn wildcard_patterns(text: &str) -> Vec<String> {
    tokenize(text)
        .iter()
        .filter(|token| is_wildcard(token))
        .map(|token| wildcard_pattern(token))
        .collect()
}

/// Split query text on whitespace, keeping quoted phrases whole.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
        } else if c.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_operator(token: &str) -> bool {
    matches!(token, "AND" | "OR" | "NOT" | "&&" | "||")
}

/// A bare term with `*` or `?`, not quoted, negated or field-qualified.
fn is_wildcard(token: &str) -> bool {
    !token.contains('"')
        && !token.contains(':')
        && !token.starts_with('-')
        && token.contains(['*', '?'])
}

/// Regex matching whole index terms for a wildcard token.
fn wildcard_pattern(token: &str) -> String {
    let mut pattern = String::new();
    for c in token.trim_start_matches('+').to_lowercase().chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern
}

/// Drop boolean operators left without an operand on both sides, e.g. after
/// wildcard terms were taken out of `foo OR bar*`.
fn drop_dangling_operators(tokens: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if is_operator(token) {
            let operand_before = kept.last().is_some_and(|t| !is_operator(t));
            let operand_after = tokens.get(i + 1).is_some_and(|t| !is_operator(t));
            let unary = token == "NOT";
            if !operand_after || (!unary && !operand_before) {
                continue;
            }
        }
        kept.push(token.clone());
    }
    kept
}
