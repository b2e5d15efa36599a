//! # Dossier Core
//!
//! Core library for the Dossier research queue. Provides the instruction
//! parser, query planner, research engine, report synthesizer, the tracking
//! ledger, the object store abstraction, and the queue processor that ties
//! them together.

pub mod config;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod planner;
pub mod queue;
pub mod report;
pub mod research;
pub mod store;

// Re-export commonly used types at the crate root.
pub use config::{DossierConfig, QueueConfig, ReportConfig, ResearchConfig, load_config};
pub use error::{DossierError, Result};
pub use instruction::{Instruction, Priority};
pub use ledger::{CsvLedger, Ledger, QueueRecord, QueueStatus, RecordUpdate};
pub use planner::QueryPlanner;
pub use queue::{ItemOutcome, QueueProcessor, RunOutcome};
pub use report::{ReportLayout, ReportSynthesizer, ResearchReport};
pub use research::{Case, DuckDuckGoProvider, ResearchEngine, SearchProvider, SearchResult};
pub use store::{FsStore, ObjectEntry, ObjectStore};
