//! Instruction document model and parser.
//!
//! Instructions arrive as semi-structured text documents dropped into the
//! pending folder. The format is a block of `HEADER: value` lines followed
//! by labelled sections:
//!
//! ```text
//! INSTRUCTION_ID: <id>
//! CATEGORY: <name>
//! CATEGORY_ID: <code>
//! PRIORITY: <Normal|High|...>
//!
//! INSTRUCTION:
//! <free text, multi-line>
//!
//! SEARCH_PARAMETERS:
//! key: value
//!
//! OUTPUT_CONFIG:
//! key: value
//! ```
//!
//! An `Instruction` is immutable once parsed; it lives for one processing
//! cycle and is discarded afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{InstructionError, Result};

/// Processing priority for an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl FromStr for Priority {
    type Err = std::convert::Infallible;

    // Unknown priority labels fall back to Normal rather than failing the
    // whole document.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Normal,
        })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Normal => write!(f, "Normal"),
            Priority::High => write!(f, "High"),
            Priority::Urgent => write!(f, "Urgent"),
        }
    }
}

/// One unit of research work, parsed from an instruction document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    /// Unique instruction identifier (ledger key).
    pub id: String,
    /// Human-readable category name.
    pub category: String,
    /// Category code.
    pub category_id: String,
    /// Processing priority.
    pub priority: Priority,
    /// Free-text research instruction.
    pub body: String,
    /// Key/value search parameters (date_range, max_results, depth, ...).
    pub search_parameters: BTreeMap<String, String>,
    /// Key/value output configuration (filename_prefix, format, ...).
    pub output_config: BTreeMap<String, String>,
}

/// Parser state while walking the document line by line.
enum Section {
    Header,
    Body,
    SearchParameters,
    OutputConfig,
}

impl Instruction {
    /// Parse an instruction document.
    ///
    /// `name` identifies the source document in error messages. Fails with
    /// [`InstructionError::MissingId`] if no `INSTRUCTION_ID` header is
    /// present; an empty body is accepted here and rejected later by the
    /// query planner.
    pub fn parse(text: &str, name: &str) -> Result<Self> {
        let mut id = String::new();
        let mut category = String::new();
        let mut category_id = String::new();
        let mut priority = Priority::Normal;
        let mut body_lines: Vec<&str> = Vec::new();
        let mut search_parameters = BTreeMap::new();
        let mut output_config = BTreeMap::new();

        let mut section = Section::Header;

        for line in text.lines() {
            if let Some(header) = section_header(line) {
                section = match header {
                    "INSTRUCTION" => Section::Body,
                    "SEARCH_PARAMETERS" => Section::SearchParameters,
                    "OUTPUT_CONFIG" => Section::OutputConfig,
                    _ => Section::Header,
                };
                if matches!(section, Section::Header) {
                    // Fall through so plain headers like INSTRUCTION_ID are
                    // handled below.
                } else {
                    continue;
                }
            }

            match section {
                Section::Header => {
                    if let Some((key, value)) = split_field(line) {
                        match key {
                            "INSTRUCTION_ID" => id = value.to_string(),
                            "CATEGORY" => category = value.to_string(),
                            "CATEGORY_ID" => category_id = value.to_string(),
                            "PRIORITY" => {
                                priority = value.parse().unwrap_or_default();
                            }
                            _ => {}
                        }
                    }
                }
                Section::Body => body_lines.push(line),
                Section::SearchParameters => {
                    if let Some((key, value)) = split_kv(line) {
                        search_parameters.insert(key.to_string(), value.to_string());
                    }
                }
                Section::OutputConfig => {
                    if let Some((key, value)) = split_kv(line) {
                        output_config.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }

        if id.is_empty() {
            return Err(InstructionError::MissingId {
                name: name.to_string(),
            }
            .into());
        }

        Ok(Self {
            id,
            category,
            category_id,
            priority,
            body: body_lines.join("\n").trim().to_string(),
            search_parameters,
            output_config,
        })
    }

    /// Re-serialize the instruction into the document format.
    ///
    /// Round-trips id, category, and priority exactly through `parse`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("INSTRUCTION_ID: {}\n", self.id));
        out.push_str(&format!("CATEGORY: {}\n", self.category));
        out.push_str(&format!("CATEGORY_ID: {}\n", self.category_id));
        out.push_str(&format!("PRIORITY: {}\n", self.priority));
        out.push_str("\nINSTRUCTION:\n");
        out.push_str(&self.body);
        out.push('\n');
        if !self.search_parameters.is_empty() {
            out.push_str("\nSEARCH_PARAMETERS:\n");
            for (key, value) in &self.search_parameters {
                out.push_str(&format!("{key}: {value}\n"));
            }
        }
        if !self.output_config.is_empty() {
            out.push_str("\nOUTPUT_CONFIG:\n");
            for (key, value) in &self.output_config {
                out.push_str(&format!("{key}: {value}\n"));
            }
        }
        out
    }

    /// Maximum cases requested by the instruction, or `default` if absent
    /// or unparseable.
    pub fn max_results(&self, default: usize) -> usize {
        self.search_parameters
            .get("max_results")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Requested date range, if any.
    pub fn date_range(&self) -> Option<&str> {
        self.search_parameters.get("date_range").map(String::as_str)
    }

    /// Requested research depth, if any.
    pub fn depth(&self) -> Option<&str> {
        self.search_parameters.get("depth").map(String::as_str)
    }

    /// Filename prefix for the output report, if the instruction names one.
    pub fn filename_prefix(&self) -> Option<&str> {
        self.output_config.get("filename_prefix").map(String::as_str)
    }

    /// Requested report format label, if any.
    pub fn format(&self) -> Option<&str> {
        self.output_config.get("format").map(String::as_str)
    }
}

/// Returns the section name if the line opens a labelled section
/// (`ALL_CAPS:` with nothing after the colon).
fn section_header(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    let name = trimmed.strip_suffix(':')?;
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_')
    {
        Some(name)
    } else {
        None
    }
}

/// Splits an `ALL_CAPS: value` header field.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_')
    {
        Some((key, value.trim()))
    } else {
        None
    }
}

/// Splits a lowercase `key: value` pair inside a parameter section.
fn split_kv(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        None
    } else {
        Some((key, value))
    }
}
