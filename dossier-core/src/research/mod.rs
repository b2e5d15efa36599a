//! Research engine — turns planned queries into ranked, deduplicated cases.
//!
//! The pipeline per instruction:
//! 1. **Search** — issue each query against the configured provider, with an
//!    enforced inter-call delay and per-query failure tolerance
//! 2. **Deduplicate** — merge results that share a normalized URL or title
//! 3. **Score** — deterministic quality scoring with corroboration weighting
//! 4. **Rank** — stable sort by descending score, truncated to `max_results`

pub mod dedup;
pub mod engine;
pub mod provider;
pub mod score;

pub use engine::{Case, ResearchEngine};
pub use provider::{DuckDuckGoProvider, SearchProvider, SearchResult, StaticProvider};
