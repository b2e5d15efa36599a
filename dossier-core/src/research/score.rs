//! Quality scoring for deduplicated results.
//!
//! The score is a deterministic function of description presence and length,
//! instruction-keyword matches, and corroboration across distinct queries.
//! Two properties must hold: more corroboration never scores lower, and a
//! non-empty description never scores lower than an empty one, all else
//! equal.

use super::dedup::MergedResult;

/// Weight for having any non-empty description.
const DESCRIPTION_WEIGHT: f64 = 1.0;
/// Description length divisor; diminishing returns cap below.
const LENGTH_DIVISOR: f64 = 400.0;
/// Cap on the length contribution.
const LENGTH_CAP: f64 = 1.5;
/// Weight per instruction keyword found in title or description.
const KEYWORD_WEIGHT: f64 = 0.5;
/// Cap on the keyword contribution.
const KEYWORD_CAP: f64 = 2.0;
/// Weight per corroborating query beyond the first.
const CORROBORATION_WEIGHT: f64 = 0.75;

/// Words too common to signal relevance.
const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "between", "both", "from", "find", "have", "into",
    "more", "most", "over", "recent", "some", "such", "that", "their", "them", "then", "these",
    "this", "using", "were", "what", "where", "which", "will", "with",
];

/// Extract relevance keywords from an instruction body: lowercase words of
/// four or more letters, stopwords removed, first-seen order, capped at 12.
pub fn extract_keywords(body: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for word in body.split(|c: char| !c.is_alphanumeric()) {
        if word.len() < 4 {
            continue;
        }
        let lower = word.to_lowercase();
        if STOPWORDS.contains(&lower.as_str()) || keywords.contains(&lower) {
            continue;
        }
        keywords.push(lower);
        if keywords.len() == 12 {
            break;
        }
    }
    keywords
}

/// Score one deduplicated result against the instruction keywords.
pub fn quality_score(result: &MergedResult, keywords: &[String]) -> f64 {
    let mut score = 0.0;

    if !result.description.is_empty() {
        score += DESCRIPTION_WEIGHT;
        score += (result.description.len() as f64 / LENGTH_DIVISOR).min(LENGTH_CAP);
    }

    let haystack = format!("{} {}", result.title, result.description).to_lowercase();
    let hits = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    score += (hits as f64 * KEYWORD_WEIGHT).min(KEYWORD_CAP);

    if result.source_queries.len() > 1 {
        score += (result.source_queries.len() - 1) as f64 * CORROBORATION_WEIGHT;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(description: &str, queries: &[&str]) -> MergedResult {
        MergedResult {
            title: "Title".into(),
            description: description.into(),
            url: "https://example.com".into(),
            source_queries: queries.iter().map(|q| q.to_string()).collect(),
        }
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords("Find recent EV battery recycling methods");
        assert!(keywords.contains(&"battery".to_string()));
        assert!(keywords.contains(&"recycling".to_string()));
        // Stopwords and short words are dropped.
        assert!(!keywords.contains(&"find".to_string()));
        assert!(!keywords.contains(&"recent".to_string()));
        assert!(!keywords.contains(&"ev".to_string()));
    }

    #[test]
    fn test_extract_keywords_deduplicates() {
        let keywords = extract_keywords("battery battery Battery");
        assert_eq!(keywords, vec!["battery".to_string()]);
    }

    #[test]
    fn test_description_never_scores_lower_than_empty() {
        let with = result("a description of the finding", &["q1"]);
        let without = result("", &["q1"]);
        assert!(quality_score(&with, &[]) > quality_score(&without, &[]));
    }

    #[test]
    fn test_corroboration_never_scores_lower() {
        let once = result("same description", &["q1"]);
        let twice = result("same description", &["q1", "q2"]);
        let thrice = result("same description", &["q1", "q2", "q3"]);
        let s1 = quality_score(&once, &[]);
        let s2 = quality_score(&twice, &[]);
        let s3 = quality_score(&thrice, &[]);
        assert!(s2 > s1);
        assert!(s3 > s2);
    }

    #[test]
    fn test_length_contribution_is_capped() {
        let medium = result(&"x".repeat(600), &["q1"]);
        let huge = result(&"x".repeat(60_000), &["q1"]);
        assert_eq!(quality_score(&medium, &[]), quality_score(&huge, &[]));
    }

    #[test]
    fn test_keyword_hits_raise_score() {
        let keywords = vec!["battery".to_string(), "recycling".to_string()];
        let relevant = result("battery recycling at scale", &["q1"]);
        let unrelated = result("cooking pasta at scale!!", &["q1"]);
        assert!(quality_score(&relevant, &keywords) > quality_score(&unrelated, &keywords));
    }

    #[test]
    fn test_score_is_deterministic() {
        let keywords = extract_keywords("battery recycling methods");
        let r = result("battery recycling description", &["q1", "q2"]);
        assert_eq!(quality_score(&r, &keywords), quality_score(&r, &keywords));
    }
}
