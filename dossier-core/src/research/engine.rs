//! Research engine — executes planned queries and produces ranked cases.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::dedup::{MergedResult, deduplicate};
use super::provider::SearchProvider;
use super::score::{extract_keywords, quality_score};
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::instruction::Instruction;

/// One synthesized, deduplicated research finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Case title.
    pub title: String,
    /// Description of the finding.
    pub summary: String,
    /// Short bullet fragments extracted from the summary.
    pub key_points: Vec<String>,
    /// URL of the source, if known.
    pub source_url: String,
    /// Deterministic quality score; cases are ordered by this, descending.
    pub quality_score: f64,
}

/// Runs searches, deduplicates, scores, and ranks results into cases.
pub struct ResearchEngine {
    provider: Arc<dyn SearchProvider>,
    config: ResearchConfig,
}

impl ResearchEngine {
    /// Create an engine over the given search provider.
    pub fn new(provider: Arc<dyn SearchProvider>, config: ResearchConfig) -> Self {
        Self { provider, config }
    }

    /// Research an instruction through its planned queries.
    ///
    /// Individual query failures are logged and skipped; research proceeds
    /// with whatever queries succeeded. Fails with
    /// [`ResearchError::Unavailable`] only when every query fails — the
    /// queue processor treats that as a retryable per-instruction failure.
    pub async fn research(
        &self,
        instruction: &Instruction,
        queries: &[String],
    ) -> Result<Vec<Case>> {
        let mut findings: Vec<MergedResult> = Vec::new();
        let mut failures = 0usize;

        for (index, query) in queries.iter().enumerate() {
            // Inter-call delay to avoid upstream throttling.
            if index > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.search_delay_ms)).await;
            }

            match self.provider.search(query).await {
                Ok(results) => {
                    debug!(query, results = results.len(), "search query succeeded");
                    findings.extend(results.into_iter().map(MergedResult::from));
                }
                Err(e) => {
                    warn!(query, error = %e, "search query failed; continuing");
                    failures += 1;
                }
            }
        }

        if !queries.is_empty() && failures == queries.len() {
            return Err(ResearchError::Unavailable {
                attempted: queries.len(),
            }
            .into());
        }

        let total = findings.len();
        let unique = deduplicate(findings);
        debug!(total, unique = unique.len(), "deduplicated findings");

        let keywords = extract_keywords(&instruction.body);
        let mut scored: Vec<(f64, MergedResult)> = unique
            .into_iter()
            .map(|r| (quality_score(&r, &keywords), r))
            .collect();

        // Stable sort keeps first-seen order for equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(instruction.max_results(self.config.max_results));

        Ok(scored
            .into_iter()
            .map(|(score, result)| Case {
                key_points: extract_key_points(&result.description, 4),
                title: result.title,
                summary: result.description,
                source_url: result.url,
                quality_score: score,
            })
            .collect())
    }
}

/// Derive short bullet fragments from a description by clause splitting.
///
/// Returns at most `max_points` fragments. A description too short or
/// undelimited to split yields itself as a single point; an empty
/// description yields no points.
pub fn extract_key_points(description: &str, max_points: usize) -> Vec<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut points: Vec<String> = trimmed
        .split(['.', ';', '!', '?'])
        .map(str::trim)
        .filter(|clause| clause.len() >= 15 && clause.len() <= 220)
        .map(str::to_string)
        .collect();
    points.truncate(max_points);

    if points.is_empty() {
        points.push(trimmed.to_string());
    }
    points
}
