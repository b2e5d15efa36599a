//! Error types for the Dossier core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering instruction parsing, research, storage, ledger, and
//! configuration domains.

use std::path::PathBuf;

/// Top-level error type for the Dossier core library.
#[derive(Debug, thiserror::Error)]
pub enum DossierError {
    #[error("Instruction error: {0}")]
    Instruction(#[from] InstructionError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from parsing or validating an instruction document.
#[derive(Debug, thiserror::Error)]
pub enum InstructionError {
    #[error("No INSTRUCTION_ID found in document '{name}'")]
    MissingId { name: String },

    #[error("Instruction '{id}' has an empty INSTRUCTION body")]
    EmptyBody { id: String },

    #[error("Malformed field '{field}': {reason}")]
    MalformedField { field: String, reason: String },
}

/// Errors from the research engine and search providers.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("All {attempted} search queries failed; research unavailable")]
    Unavailable { attempted: usize },

    #[error("Search request failed for query '{query}': {message}")]
    SearchFailed { query: String, message: String },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },
}

/// Errors from the object store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Object not found: {id}")]
    NotFound { id: String },

    #[error("Failed to list folder '{folder}': {message}")]
    ListFailed { folder: String, message: String },

    #[error("Failed to read object '{id}': {message}")]
    ReadFailed { id: String, message: String },

    #[error("Failed to write object '{name}' to '{folder}': {message}")]
    WriteFailed {
        folder: String,
        name: String,
        message: String,
    },

    #[error("Failed to move object '{id}' to '{to_folder}': {message}")]
    MoveFailed {
        id: String,
        to_folder: String,
        message: String,
    },
}

/// Errors from the tracking ledger collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("No ledger record for instruction '{instruction_id}'")]
    RecordNotFound { instruction_id: String },

    #[error("Ledger read failed: {message}")]
    ReadFailed { message: String },

    #[error("Ledger update failed for '{instruction_id}': {message}")]
    UpdateFailed {
        instruction_id: String,
        message: String,
    },

    #[error("Ledger file is malformed at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl DossierError {
    /// Whether a failed instruction may be retried on a later cycle.
    ///
    /// Malformed instructions can never succeed, so they go terminal on the
    /// first failure. Everything else (unreachable search provider, store or
    /// ledger write failures, archival failures) is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DossierError::Instruction(_))
    }
}

/// A type alias for results using the top-level `DossierError`.
pub type Result<T> = std::result::Result<T, DossierError>;
