//! Query planner - expands an instruction into search query variants.
//!
//! Derives a base query from the instruction body, then widens coverage with
//! qualifier variants drawn from the category and search parameters. The
//! plan is always non-empty, bounded, and free of (case-insensitive)
//! duplicates.

use crate::error::{InstructionError, Result};
use crate::instruction::Instruction;

/// Hard ceiling on query variants regardless of configuration.
const MAX_VARIANTS: usize = 8;

/// Expands instructions into ordered lists of search queries.
pub struct QueryPlanner {
    max_queries: usize,
}

impl QueryPlanner {
    /// Create a planner producing at most `max_queries` variants.
    pub fn new(max_queries: usize) -> Self {
        Self {
            max_queries: max_queries.clamp(1, MAX_VARIANTS),
        }
    }

    /// Plan the search queries for an instruction.
    ///
    /// Fails with [`InstructionError::EmptyBody`] when the body is empty or
    /// whitespace-only; callers must not proceed to the research engine in
    /// that case.
    pub fn plan(&self, instruction: &Instruction) -> Result<Vec<String>> {
        let base = base_query(&instruction.body);
        if base.is_empty() {
            return Err(InstructionError::EmptyBody {
                id: instruction.id.clone(),
            }
            .into());
        }

        let mut candidates = vec![base.clone()];

        if !instruction.category.is_empty() {
            candidates.push(format!("{} {}", instruction.category, base));
        }
        if let Some(range) = instruction.date_range() {
            candidates.push(format!("{base} {range}"));
        }
        if let Some(depth) = instruction.depth() {
            candidates.push(format!("{base} {depth} analysis"));
        }
        candidates.push(format!("{base} examples"));
        candidates.push(format!("recent {base}"));

        // Case-insensitive dedup, preserving first-seen order.
        let mut seen = std::collections::HashSet::new();
        let mut queries = Vec::new();
        for candidate in candidates {
            let key = candidate.to_lowercase();
            if seen.insert(key) {
                queries.push(candidate);
            }
            if queries.len() == self.max_queries {
                break;
            }
        }

        Ok(queries)
    }
}

/// Derive the base query from the instruction body: the first sentence,
/// falling back to the first line, falling back to the whole body.
fn base_query(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let first_line = trimmed.lines().next().unwrap_or(trimmed);
    let sentence = first_line
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(first_line);

    sentence.trim_end_matches(['.', '!', '?']).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Priority;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn make_instruction(body: &str, category: &str) -> Instruction {
        Instruction {
            id: "T1".into(),
            category: category.into(),
            category_id: "C1".into(),
            priority: Priority::Normal,
            body: body.into(),
            search_parameters: BTreeMap::new(),
            output_config: BTreeMap::new(),
        }
    }

    #[test]
    fn test_plan_nonempty_for_any_body() {
        let planner = QueryPlanner::new(6);
        let queries = planner.plan(&make_instruction("x", "")).unwrap();
        assert!(!queries.is_empty());
        assert_eq!(queries[0], "x");
    }

    #[test]
    fn test_plan_empty_body_fails() {
        let planner = QueryPlanner::new(6);
        let err = planner.plan(&make_instruction("   \n  ", "Tech")).unwrap_err();
        assert!(err.to_string().contains("empty INSTRUCTION body"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_plan_uses_first_sentence() {
        let planner = QueryPlanner::new(6);
        let instruction =
            make_instruction("Find EV battery recycling methods. Focus on Europe.", "");
        let queries = planner.plan(&instruction).unwrap();
        assert_eq!(queries[0], "Find EV battery recycling methods");
    }

    #[test]
    fn test_plan_includes_category_and_parameters() {
        let mut instruction = make_instruction("battery recycling", "Technology");
        instruction
            .search_parameters
            .insert("date_range".into(), "last 6 months".into());
        instruction
            .search_parameters
            .insert("depth".into(), "deep".into());

        let planner = QueryPlanner::new(8);
        let queries = planner.plan(&instruction).unwrap();
        assert!(queries.contains(&"Technology battery recycling".to_string()));
        assert!(queries.contains(&"battery recycling last 6 months".to_string()));
        assert!(queries.contains(&"battery recycling deep analysis".to_string()));
    }

    #[test]
    fn test_plan_no_case_insensitive_duplicates() {
        // Category equal to the body base produces a candidate that only
        // differs in spacing from "<category> <base>" combinations.
        let instruction = make_instruction("Recent news", "recent");
        let planner = QueryPlanner::new(8);
        let queries = planner.plan(&instruction).unwrap();

        let mut lowered: Vec<String> = queries.iter().map(|q| q.to_lowercase()).collect();
        lowered.sort();
        lowered.dedup();
        assert_eq!(lowered.len(), queries.len());
    }

    #[test]
    fn test_plan_bounded() {
        let mut instruction = make_instruction("a very specific topic", "Category");
        instruction
            .search_parameters
            .insert("date_range".into(), "2024".into());
        instruction
            .search_parameters
            .insert("depth".into(), "deep".into());

        let planner = QueryPlanner::new(3);
        let queries = planner.plan(&instruction).unwrap();
        assert_eq!(queries.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_plan_never_duplicates(body in "[a-zA-Z ]{1,40}", category in "[a-zA-Z]{0,12}") {
            let planner = QueryPlanner::new(8);
            let instruction = make_instruction(&body, &category);
            if let Ok(queries) = planner.plan(&instruction) {
                prop_assert!(!queries.is_empty());
                let mut lowered: Vec<String> =
                    queries.iter().map(|q| q.to_lowercase()).collect();
                lowered.sort();
                lowered.dedup();
                prop_assert_eq!(lowered.len(), queries.len());
            }
        }
    }
}
