//! Report synthesis — assembles ranked cases into a report document.
//!
//! Synthesis is pure and deterministic: the generation timestamp is injected
//! by the caller, never read from the clock here, so identical inputs always
//! yield identical reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::instruction::Instruction;
use crate::research::Case;

/// Named report layout variants, selected via the instruction's
/// `OUTPUT_CONFIG format:` entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportLayout {
    /// Full report: one titled section per case with key points.
    #[default]
    Detailed,
    /// Compact listing: one line per case.
    Summary,
}

impl ReportLayout {
    /// Resolve a format label from an instruction; unknown labels fall back
    /// to the given default.
    pub fn from_label(label: Option<&str>, default: ReportLayout) -> Self {
        match label.map(str::to_ascii_lowercase).as_deref() {
            Some("summary") => ReportLayout::Summary,
            Some("detailed") => ReportLayout::Detailed,
            _ => default,
        }
    }
}

/// The unit persisted to the report store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    /// Instruction this report answers.
    pub instruction_id: String,
    /// Injected generation timestamp.
    pub generated_at: DateTime<Utc>,
    /// Ranked cases, best first.
    pub cases: Vec<Case>,
    /// Layout used for rendering.
    pub layout: ReportLayout,
    /// Report metadata (case count, research query, generation time).
    pub metadata: BTreeMap<String, String>,
    title: String,
    research_query: String,
}

/// Builds report documents from instructions and ranked cases.
pub struct ReportSynthesizer;

impl ReportSynthesizer {
    /// Synthesize a report. An empty case list is a valid outcome and still
    /// produces a report, marked "No cases found".
    pub fn synthesize(
        instruction: &Instruction,
        cases: Vec<Case>,
        generated_at: DateTime<Utc>,
        layout: ReportLayout,
    ) -> ResearchReport {
        let title = if instruction.category.is_empty() {
            format!("Research Report: {}", instruction.id)
        } else {
            format!("Research Report: {} — {}", instruction.category, instruction.id)
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("cases_found".to_string(), cases.len().to_string());
        metadata.insert("generated_at".to_string(), generated_at.to_rfc3339());
        metadata.insert("instruction_id".to_string(), instruction.id.clone());
        metadata.insert("category_id".to_string(), instruction.category_id.clone());

        ResearchReport {
            instruction_id: instruction.id.clone(),
            generated_at,
            cases,
            layout,
            metadata,
            title,
            research_query: instruction.body.clone(),
        }
    }
}

impl ResearchReport {
    /// Number of cases in the report.
    pub fn cases_found(&self) -> usize {
        self.cases.len()
    }

    /// Render the report as a markdown document.
    pub fn render(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        out.push_str(&format!(
            "Generated: {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        out.push_str("## Introduction\n\n");
        out.push_str(&format!(
            "This report presents the findings for the research instruction: \
             \"{}\".\n\n",
            self.research_query
        ));

        match self.layout {
            ReportLayout::Detailed => self.render_detailed(&mut out),
            ReportLayout::Summary => self.render_summary(&mut out),
        }

        out.push_str("\n## Metadata\n\n");
        for (key, value) in &self.metadata {
            out.push_str(&format!("- {key}: {value}\n"));
        }

        out
    }

    fn render_detailed(&self, out: &mut String) {
        out.push_str("## Cases\n\n");
        if self.cases.is_empty() {
            out.push_str("### No cases found\n\nThe research process did not identify any cases matching the instruction.\n");
            return;
        }
        for (index, case) in self.cases.iter().enumerate() {
            out.push_str(&format!("### {}. {}\n\n", index + 1, case.title));
            if !case.source_url.is_empty() {
                out.push_str(&format!("**Source:** {}\n\n", case.source_url));
            }
            if !case.summary.is_empty() {
                out.push_str(&format!("{}\n\n", case.summary));
            }
            if !case.key_points.is_empty() {
                out.push_str("**Key points:**\n");
                for point in &case.key_points {
                    out.push_str(&format!("- {point}\n"));
                }
                out.push('\n');
            }
            out.push_str("---\n\n");
        }
    }

    fn render_summary(&self, out: &mut String) {
        out.push_str("## Cases\n\n");
        if self.cases.is_empty() {
            out.push_str("No cases found.\n");
            return;
        }
        for (index, case) in self.cases.iter().enumerate() {
            out.push_str(&format!(
                "{}. **{}** ({})\n",
                index + 1,
                case.title,
                if case.source_url.is_empty() {
                    "no source"
                } else {
                    &case.source_url
                }
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Priority;
    use chrono::TimeZone;

    fn make_instruction() -> Instruction {
        Instruction {
            id: "T1".into(),
            category: "Technology".into(),
            category_id: "C1".into(),
            priority: Priority::Normal,
            body: "Find battery recycling methods".into(),
            search_parameters: BTreeMap::new(),
            output_config: BTreeMap::new(),
        }
    }

    fn make_case(title: &str) -> Case {
        Case {
            title: title.into(),
            summary: "A description of the finding.".into(),
            key_points: vec!["A description of the finding".into()],
            source_url: "https://example.com/a".into(),
            quality_score: 2.5,
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let instruction = make_instruction();
        let a = ReportSynthesizer::synthesize(
            &instruction,
            vec![make_case("A")],
            fixed_time(),
            ReportLayout::Detailed,
        );
        let b = ReportSynthesizer::synthesize(
            &instruction,
            vec![make_case("A")],
            fixed_time(),
            ReportLayout::Detailed,
        );
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn test_detailed_report_contains_cases_in_order() {
        let instruction = make_instruction();
        let report = ReportSynthesizer::synthesize(
            &instruction,
            vec![make_case("First"), make_case("Second")],
            fixed_time(),
            ReportLayout::Detailed,
        );
        let rendered = report.render();
        assert!(rendered.contains("# Research Report: Technology — T1"));
        let first = rendered.find("1. First").unwrap();
        let second = rendered.find("2. Second").unwrap();
        assert!(first < second);
        assert!(rendered.contains("**Key points:**"));
    }

    #[test]
    fn test_empty_report_has_marker() {
        let instruction = make_instruction();
        let report = ReportSynthesizer::synthesize(
            &instruction,
            vec![],
            fixed_time(),
            ReportLayout::Detailed,
        );
        assert_eq!(report.cases_found(), 0);
        let rendered = report.render();
        assert!(rendered.contains("No cases found"));
        assert!(rendered.contains("cases_found: 0"));
    }

    #[test]
    fn test_summary_layout() {
        let instruction = make_instruction();
        let report = ReportSynthesizer::synthesize(
            &instruction,
            vec![make_case("Only")],
            fixed_time(),
            ReportLayout::Summary,
        );
        let rendered = report.render();
        assert!(rendered.contains("1. **Only**"));
        assert!(!rendered.contains("### 1."));
    }

    #[test]
    fn test_layout_from_label() {
        assert_eq!(
            ReportLayout::from_label(Some("summary"), ReportLayout::Detailed),
            ReportLayout::Summary
        );
        assert_eq!(
            ReportLayout::from_label(Some("fancy"), ReportLayout::Detailed),
            ReportLayout::Detailed
        );
        assert_eq!(
            ReportLayout::from_label(None, ReportLayout::Summary),
            ReportLayout::Summary
        );
    }
}
