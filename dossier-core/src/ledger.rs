//! Tracking ledger — per-instruction queue records.
//!
//! The ledger is the external source of truth for instruction state across
//! runs. Records follow a fixed, order-significant column schema owned by
//! the tracking sheet; `CsvLedger` implements it over a local CSV file.
//! Every mutation re-reads the latest state first — no cached copy is ever
//! assumed current.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::LedgerError;

/// Order-significant ledger columns.
pub const COLUMNS: [&str; 11] = [
    "Instruction_ID",
    "Status",
    "Manus_Started",
    "Manus_Completed",
    "Result_Doc_ID",
    "Result_Folder",
    "Cases_Found",
    "Processing_Time_MS",
    "Error_Message",
    "Retry_Count",
    "Last_Error_Time",
];

/// Processing state of a queued instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Complete,
    Failed,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "Pending"),
            QueueStatus::Processing => write!(f, "Processing"),
            QueueStatus::Complete => write!(f, "Complete"),
            QueueStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for QueueStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "complete" => Ok(QueueStatus::Complete),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(LedgerError::Malformed {
                line: 0,
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

impl QueueStatus {
    /// Whether the record can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Complete | QueueStatus::Failed)
    }
}

/// One ledger row, keyed by instruction id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueRecord {
    pub instruction_id: String,
    pub status: QueueStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_doc_id: String,
    pub result_folder: String,
    pub cases_found: u32,
    pub processing_time_ms: u64,
    pub error_message: String,
    pub retry_count: u32,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl QueueRecord {
    /// A fresh Pending record for a newly submitted instruction.
    pub fn pending(instruction_id: impl Into<String>) -> Self {
        Self {
            instruction_id: instruction_id.into(),
            ..Self::default()
        }
    }
}

/// A partial update to a ledger record. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<QueueStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_doc_id: Option<String>,
    pub result_folder: Option<String>,
    pub cases_found: Option<u32>,
    pub processing_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub retry_count: Option<u32>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    pub fn status(mut self, status: QueueStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn result_doc_id(mut self, id: impl Into<String>) -> Self {
        self.result_doc_id = Some(id.into());
        self
    }

    pub fn result_folder(mut self, folder: impl Into<String>) -> Self {
        self.result_folder = Some(folder.into());
        self
    }

    pub fn cases_found(mut self, n: u32) -> Self {
        self.cases_found = Some(n);
        self
    }

    pub fn processing_time_ms(mut self, ms: u64) -> Self {
        self.processing_time_ms = Some(ms);
        self
    }

    /// Error messages are truncated to 500 characters before storage.
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > 500 {
            let mut cut = 500;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        self.error_message = Some(message);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn last_error_time(mut self, at: DateTime<Utc>) -> Self {
        self.last_error_time = Some(at);
        self
    }

    fn apply(self, record: &mut QueueRecord) {
        if let Some(v) = self.status {
            record.status = v;
        }
        if let Some(v) = self.started_at {
            record.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            record.completed_at = Some(v);
        }
        if let Some(v) = self.result_doc_id {
            record.result_doc_id = v;
        }
        if let Some(v) = self.result_folder {
            record.result_folder = v;
        }
        if let Some(v) = self.cases_found {
            record.cases_found = v;
        }
        if let Some(v) = self.processing_time_ms {
            record.processing_time_ms = v;
        }
        if let Some(v) = self.error_message {
            record.error_message = v;
        }
        if let Some(v) = self.retry_count {
            record.retry_count = v;
        }
        if let Some(v) = self.last_error_time {
            record.last_error_time = Some(v);
        }
    }
}

/// The external tracking ledger collaborator.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch the latest record for an instruction, if one exists.
    async fn get_record(&self, instruction_id: &str) -> Result<Option<QueueRecord>, LedgerError>;

    /// Apply a partial update, creating the record if it does not exist.
    /// Reads the latest stored state before mutating.
    async fn update_record(
        &self,
        instruction_id: &str,
        update: RecordUpdate,
    ) -> Result<(), LedgerError>;

    /// All records, in stored order.
    async fn list_records(&self) -> Result<Vec<QueueRecord>, LedgerError>;
}

/// CSV-file ledger with the tracking sheet's column schema.
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<QueueRecord>, LedgerError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LedgerError::ReadFailed {
                    message: e.to_string(),
                });
            }
        };
        parse_csv(&text)
    }

    async fn save(&self, records: &[QueueRecord]) -> Result<(), LedgerError> {
        let save_err = |message: String| LedgerError::UpdateFailed {
            instruction_id: String::new(),
            message,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| save_err(e.to_string()))?;
        }

        // Write to a sibling temp path and rename, so a crash mid-write
        // cannot leave a truncated ledger behind.
        let tmp = self.path.with_extension("csv.tmp");
        tokio::fs::write(&tmp, render_csv(records))
            .await
            .map_err(|e| save_err(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| save_err(e.to_string()))
    }
}

#[async_trait]
impl Ledger for CsvLedger {
    async fn get_record(&self, instruction_id: &str) -> Result<Option<QueueRecord>, LedgerError> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .find(|r| r.instruction_id == instruction_id))
    }

    async fn update_record(
        &self,
        instruction_id: &str,
        update: RecordUpdate,
    ) -> Result<(), LedgerError> {
        let mut records = self.load().await?;
        match records
            .iter_mut()
            .find(|r| r.instruction_id == instruction_id)
        {
            Some(record) => update.apply(record),
            None => {
                let mut record = QueueRecord::pending(instruction_id);
                update.apply(&mut record);
                records.push(record);
            }
        }
        self.save(&records).await
    }

    async fn list_records(&self) -> Result<Vec<QueueRecord>, LedgerError> {
        self.load().await
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn parse_time(field: &str, line: usize) -> Result<Option<DateTime<Utc>>, LedgerError> {
    if field.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(field)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| LedgerError::Malformed {
            line,
            message: format!("bad timestamp '{field}': {e}"),
        })
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_csv(records: &[QueueRecord]) -> String {
    let mut out = COLUMNS.join(",");
    out.push('\n');
    for r in records {
        let fields = [
            quote(&r.instruction_id),
            r.status.to_string(),
            format_time(r.started_at),
            format_time(r.completed_at),
            quote(&r.result_doc_id),
            quote(&r.result_folder),
            r.cases_found.to_string(),
            r.processing_time_ms.to_string(),
            quote(&r.error_message),
            r.retry_count.to_string(),
            format_time(r.last_error_time),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Minimal CSV reader: handles quoted fields, embedded commas, doubled
/// quotes, and newlines inside quotes.
fn split_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\r' => {}
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    if row.iter().any(|f| !f.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    } else {
                        row.clear();
                    }
                }
                _ => field.push(ch),
            }
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        if row.iter().any(|f| !f.is_empty()) {
            rows.push(row);
        }
    }
    rows
}

fn parse_csv(text: &str) -> Result<Vec<QueueRecord>, LedgerError> {
    let mut records = Vec::new();
    for (index, row) in split_rows(text).into_iter().enumerate() {
        if index == 0 && row.first().map(String::as_str) == Some(COLUMNS[0]) {
            continue; // header
        }
        let line = index + 1;
        if row.len() != COLUMNS.len() {
            return Err(LedgerError::Malformed {
                line,
                message: format!("expected {} columns, found {}", COLUMNS.len(), row.len()),
            });
        }
        records.push(QueueRecord {
            instruction_id: row[0].clone(),
            status: row[1].parse()?,
            started_at: parse_time(&row[2], line)?,
            completed_at: parse_time(&row[3], line)?,
            result_doc_id: row[4].clone(),
            result_folder: row[5].clone(),
            cases_found: parse_number(&row[6], line)? as u32,
            processing_time_ms: parse_number(&row[7], line)?,
            error_message: row[8].clone(),
            retry_count: parse_number(&row[9], line)? as u32,
            last_error_time: parse_time(&row[10], line)?,
        });
    }
    Ok(records)
}

fn parse_number(field: &str, line: usize) -> Result<u64, LedgerError> {
    if field.is_empty() {
        return Ok(0);
    }
    field.parse().map_err(|_| LedgerError::Malformed {
        line,
        message: format!("bad number '{field}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_ledger() -> (tempfile::TempDir, CsvLedger) {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = CsvLedger::new(dir.path().join("ledger.csv"));
        (dir, ledger)
    }

    #[tokio::test]
    async fn test_get_record_missing_file() {
        let (_dir, ledger) = temp_ledger();
        assert!(ledger.get_record("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_creates_and_roundtrips() {
        let (_dir, ledger) = temp_ledger();
        let started = Utc::now();
        ledger
            .update_record(
                "T1",
                RecordUpdate::default()
                    .status(QueueStatus::Processing)
                    .started_at(started),
            )
            .await
            .unwrap();

        let record = ledger.get_record("T1").await.unwrap().unwrap();
        assert_eq!(record.status, QueueStatus::Processing);
        assert_eq!(record.started_at.unwrap(), started);
        assert_eq!(record.retry_count, 0);
    }

    #[tokio::test]
    async fn test_partial_update_preserves_other_fields() {
        let (_dir, ledger) = temp_ledger();
        ledger
            .update_record("T1", RecordUpdate::default().retry_count(2))
            .await
            .unwrap();
        ledger
            .update_record("T1", RecordUpdate::default().status(QueueStatus::Failed))
            .await
            .unwrap();

        let record = ledger.get_record("T1").await.unwrap().unwrap();
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.status, QueueStatus::Failed);
    }

    #[tokio::test]
    async fn test_error_message_with_commas_and_quotes() {
        let (_dir, ledger) = temp_ledger();
        let message = "Store error: Failed to write \"report\", disk full\nsecond line";
        ledger
            .update_record("T1", RecordUpdate::default().error_message(message))
            .await
            .unwrap();

        let record = ledger.get_record("T1").await.unwrap().unwrap();
        assert_eq!(record.error_message, message);
    }

    #[tokio::test]
    async fn test_error_message_truncated_to_500() {
        let (_dir, ledger) = temp_ledger();
        let long = "e".repeat(800);
        ledger
            .update_record("T1", RecordUpdate::default().error_message(long))
            .await
            .unwrap();
        let record = ledger.get_record("T1").await.unwrap().unwrap();
        assert_eq!(record.error_message.len(), 500);
    }

    #[tokio::test]
    async fn test_list_records_keeps_order() {
        let (_dir, ledger) = temp_ledger();
        for id in ["A", "B", "C"] {
            ledger
                .update_record(id, RecordUpdate::default())
                .await
                .unwrap();
        }
        let ids: Vec<String> = ledger
            .list_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.instruction_id)
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_save_replaces_file_without_leftovers() {
        let (dir, ledger) = temp_ledger();
        ledger
            .update_record("T1", RecordUpdate::default().status(QueueStatus::Processing))
            .await
            .unwrap();
        ledger
            .update_record("T1", RecordUpdate::default().status(QueueStatus::Complete))
            .await
            .unwrap();

        // Only the ledger file itself remains; no temp file survives a save.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["ledger.csv".to_string()]);

        let record = ledger.get_record("T1").await.unwrap().unwrap();
        assert_eq!(record.status, QueueStatus::Complete);
    }

    #[test]
    fn test_csv_header_schema() {
        let rendered = render_csv(&[]);
        assert_eq!(
            rendered.lines().next().unwrap(),
            "Instruction_ID,Status,Manus_Started,Manus_Completed,Result_Doc_ID,Result_Folder,\
             Cases_Found,Processing_Time_MS,Error_Message,Retry_Count,Last_Error_Time"
        );
    }

    #[test]
    fn test_parse_rejects_short_row() {
        let err = parse_csv("T1,Pending\n").unwrap_err();
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Complete".parse::<QueueStatus>().unwrap(), QueueStatus::Complete);
        assert_eq!("".parse::<QueueStatus>().unwrap(), QueueStatus::Pending);
        assert!("Done".parse::<QueueStatus>().is_err());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
    }
}
