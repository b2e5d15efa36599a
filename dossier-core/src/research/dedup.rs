//! Result deduplication.
//!
//! Two results describe the same case when their normalized URLs match or
//! their normalized titles match. Merging keeps the longer non-empty
//! description and unions query provenance; provenance never affects
//! identity. The operation is idempotent.

use url::Url;

use super::provider::SearchResult;

/// A deduplicated result with merged provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult {
    /// Title of the first-seen result in the group.
    pub title: String,
    /// The longest non-empty description seen across the group.
    pub description: String,
    /// URL of the first-seen result in the group.
    pub url: String,
    /// Distinct queries that surfaced this result, in first-seen order.
    pub source_queries: Vec<String>,
}

impl From<SearchResult> for MergedResult {
    fn from(result: SearchResult) -> Self {
        let source_queries = if result.source_query.is_empty() {
            Vec::new()
        } else {
            vec![result.source_query]
        };
        Self {
            title: result.title,
            description: result.snippet,
            url: result.url,
            source_queries,
        }
    }
}

impl MergedResult {
    fn absorb(&mut self, other: MergedResult) {
        if other.description.len() > self.description.len() {
            self.description = other.description;
        }
        if self.url.is_empty() && !other.url.is_empty() {
            self.url = other.url;
        }
        for query in other.source_queries {
            if !self.source_queries.contains(&query) {
                self.source_queries.push(query);
            }
        }
    }
}

/// Normalize a URL for identity comparison: scheme, host, and path with any
/// trailing slash removed; query parameters sorted so ordering is ignored;
/// fragments dropped. Returns `None` for empty or unparseable URLs.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed).ok()?;
    let host = parsed.host_str()?;

    let path = parsed.path().trim_end_matches('/');

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut normalized = format!("{}://{}{}", parsed.scheme(), host.to_lowercase(), path);
    if !pairs.is_empty() {
        let query: Vec<String> = pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        normalized.push('?');
        normalized.push_str(&query.join("&"));
    }
    Some(normalized)
}

/// Normalize a title for identity comparison: lowercase with runs of
/// whitespace collapsed to single spaces. Returns `None` when nothing
/// remains.
pub fn normalize_title(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

/// Deduplicate results, preserving first-seen order of the survivors.
pub fn deduplicate(results: Vec<MergedResult>) -> Vec<MergedResult> {
    let mut merged: Vec<MergedResult> = Vec::new();
    let mut by_url: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut by_title: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for result in results {
        let url_key = normalize_url(&result.url);
        let title_key = normalize_title(&result.title);

        let existing = url_key
            .as_ref()
            .and_then(|k| by_url.get(k))
            .or_else(|| title_key.as_ref().and_then(|k| by_title.get(k)))
            .copied();

        match existing {
            Some(index) => merged[index].absorb(result),
            None => {
                let index = merged.len();
                if let Some(k) = url_key {
                    by_url.insert(k, index);
                }
                if let Some(k) = title_key {
                    by_title.insert(k, index);
                }
                merged.push(result);
            }
        }
    }

    merged
}
