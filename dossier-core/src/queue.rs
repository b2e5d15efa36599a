//! Queue processor — drives one instruction through its lifecycle.
//!
//! States per instruction: `Pending -> Processing -> {Complete, Failed}`.
//! One invocation processes at most one instruction (the oldest eligible)
//! and exits; the repeating cadence comes from an external scheduler. A
//! failing instruction never aborts the run or blocks later cycles: its
//! outcome is recorded in the ledger and the retry accounting decides
//! whether it becomes Pending again or goes terminal.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DossierConfig;
use crate::error::{DossierError, Result};
use crate::instruction::Instruction;
use crate::ledger::{Ledger, QueueRecord, QueueStatus, RecordUpdate};
use crate::planner::QueryPlanner;
use crate::report::{ReportLayout, ReportSynthesizer};
use crate::research::{ResearchEngine, SearchProvider};
use crate::store::{ObjectEntry, ObjectStore};

/// Result of one `run_once` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No eligible instruction was found.
    Idle,
    /// One instruction was processed (successfully or not).
    Processed(ItemOutcome),
}

/// Per-item result consumed by the queue loop and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Report persisted, ledger Complete, source archived.
    Completed {
        instruction_id: String,
        result_doc_id: String,
        cases_found: u32,
    },
    /// Retryable failure; the instruction is Pending again.
    Retried {
        instruction_id: String,
        retry_count: u32,
        error: String,
    },
    /// Terminal failure; the instruction is Failed and stays in place.
    Failed {
        instruction_id: String,
        error: String,
    },
}

/// Orchestrates planner, research engine, synthesizer, store, and ledger.
pub struct QueueProcessor {
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn Ledger>,
    planner: QueryPlanner,
    engine: ResearchEngine,
    config: DossierConfig,
}

impl QueueProcessor {
    /// Wire a processor over its collaborators.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ledger: Arc<dyn Ledger>,
        provider: Arc<dyn SearchProvider>,
        config: DossierConfig,
    ) -> Self {
        Self {
            planner: QueryPlanner::new(config.research.max_queries),
            engine: ResearchEngine::new(provider, config.research.clone()),
            store,
            ledger,
            config,
        }
    }

    /// Process the oldest eligible pending instruction, if any.
    ///
    /// Only collaborator-bootstrap failures (the pending folder or the
    /// ledger unreachable at selection time) escape as `Err`; everything
    /// that goes wrong with the selected instruction is absorbed into its
    /// ledger record and reported as an [`ItemOutcome`].
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let entries = self.store.list(&self.config.queue.pending_folder).await?;
        debug!(pending = entries.len(), "listed pending folder");

        for entry in entries {
            if self.config.queue.test_mode && !entry.name.starts_with("TEST_") {
                continue;
            }

            let content = match self.store.read(&entry.id).await {
                Ok(content) => content,
                Err(e) => {
                    // Cannot identify the instruction, so there is no record
                    // to account the failure against. Leave it for the next
                    // cycle and look at the next entry.
                    warn!(object = %entry.name, error = %e, "failed to read pending document");
                    continue;
                }
            };

            let instruction = match Instruction::parse(&content, &entry.name) {
                Ok(instruction) => instruction,
                Err(e) => {
                    warn!(object = %entry.name, error = %e, "unidentifiable instruction document");
                    continue;
                }
            };

            // Always the latest record; a human may have edited the ledger
            // since the last cycle.
            let record = self
                .ledger
                .get_record(&instruction.id)
                .await
                .map_err(DossierError::from)?
                .unwrap_or_else(|| QueueRecord::pending(&instruction.id));

            match self.evaluate(&entry, &instruction, record).await? {
                Eligibility::Skip => continue,
                Eligibility::Resolved(outcome) => return Ok(RunOutcome::Processed(outcome)),
                Eligibility::Process(record) => {
                    let outcome = self.process_item(&entry, &instruction, record).await;
                    return Ok(RunOutcome::Processed(outcome));
                }
            }
        }

        info!("no eligible pending instructions");
        Ok(RunOutcome::Idle)
    }

    /// Decide whether a listed instruction is processable this cycle.
    async fn evaluate(
        &self,
        entry: &ObjectEntry,
        instruction: &Instruction,
        record: QueueRecord,
    ) -> Result<Eligibility> {
        match record.status {
            // Failed items stay in the pending folder for manual
            // inspection; Complete leftovers are archival stragglers
            // handled by the re-research guard below.
            QueueStatus::Failed => {
                debug!(id = %instruction.id, "skipping Failed instruction");
                Ok(Eligibility::Skip)
            }
            QueueStatus::Complete if record.result_doc_id.is_empty() => {
                debug!(id = %instruction.id, "skipping Complete instruction");
                Ok(Eligibility::Skip)
            }
            QueueStatus::Complete => Ok(Eligibility::Process(record)),
            QueueStatus::Pending => Ok(Eligibility::Process(record)),
            QueueStatus::Processing => {
                // A record left Processing belongs to a crashed run. Young
                // ones are skipped; stale ones go through retry evaluation
                // so a crash loop still converges to Failed.
                let reference = record
                    .last_error_time
                    .or(record.started_at)
                    .unwrap_or_else(|| entry.created_time);
                let age = Utc::now().signed_duration_since(reference);
                if age.num_seconds() < self.config.queue.stale_after_secs as i64 {
                    debug!(id = %instruction.id, "skipping fresh Processing record");
                    return Ok(Eligibility::Skip);
                }

                warn!(id = %instruction.id, age_secs = age.num_seconds(), "recovering stale Processing record");
                let retry_count =
                    (record.retry_count + 1).min(self.config.queue.max_retries);
                if retry_count >= self.config.queue.max_retries {
                    self.ledger
                        .update_record(
                            &instruction.id,
                            RecordUpdate::default()
                                .status(QueueStatus::Failed)
                                .retry_count(retry_count)
                                .error_message("stale Processing record; retries exhausted")
                                .last_error_time(Utc::now()),
                        )
                        .await
                        .map_err(DossierError::from)?;
                    return Ok(Eligibility::Resolved(ItemOutcome::Failed {
                        instruction_id: instruction.id.clone(),
                        error: "stale Processing record; retries exhausted".into(),
                    }));
                }

                self.ledger
                    .update_record(
                        &instruction.id,
                        RecordUpdate::default()
                            .retry_count(retry_count)
                            .error_message("recovered stale Processing record")
                            .last_error_time(Utc::now()),
                    )
                    .await
                    .map_err(DossierError::from)?;

                let mut record = record;
                record.retry_count = retry_count;
                Ok(Eligibility::Process(record))
            }
        }
    }

    /// Run the full pipeline for one selected instruction.
    async fn process_item(
        &self,
        entry: &ObjectEntry,
        instruction: &Instruction,
        record: QueueRecord,
    ) -> ItemOutcome {
        info!(id = %instruction.id, category = %instruction.category, "processing instruction");
        let timer = Instant::now();

        // Re-research guard: a non-empty result_doc_id means a previous
        // attempt already persisted the report and only archival failed.
        // Never research twice for the same attempt.
        if !record.result_doc_id.is_empty() {
            info!(id = %instruction.id, doc = %record.result_doc_id, "report exists; completing archival only");
            return match self.complete_and_archive(entry, instruction, &record).await {
                Ok(()) => ItemOutcome::Completed {
                    instruction_id: instruction.id.clone(),
                    result_doc_id: record.result_doc_id.clone(),
                    cases_found: record.cases_found,
                },
                Err(e) => self.fail_item(instruction, e).await,
            };
        }

        match self.pipeline(entry, instruction, timer).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail_item(instruction, e).await,
        }
    }

    async fn pipeline(
        &self,
        entry: &ObjectEntry,
        instruction: &Instruction,
        timer: Instant,
    ) -> Result<ItemOutcome> {
        self.ledger
            .update_record(
                &instruction.id,
                RecordUpdate::default()
                    .status(QueueStatus::Processing)
                    .started_at(Utc::now()),
            )
            .await
            .map_err(DossierError::from)?;

        let queries = self.planner.plan(instruction)?;
        debug!(id = %instruction.id, queries = queries.len(), "planned queries");

        let cases = self.engine.research(instruction, &queries).await?;
        info!(id = %instruction.id, cases = cases.len(), "research finished");

        let layout =
            ReportLayout::from_label(instruction.format(), self.config.report.default_layout);
        let report =
            ReportSynthesizer::synthesize(instruction, cases, Utc::now(), layout);
        let cases_found = report.cases_found() as u32;

        let prefix = instruction
            .filename_prefix()
            .unwrap_or(&self.config.report.default_filename_prefix);
        let mut name = format!(
            "{}{}_{}.md",
            prefix,
            Utc::now().format("%Y%m%d"),
            instruction.id
        );
        if self.config.queue.test_mode {
            name = format!("[TEST] {name}");
        }

        let result_doc_id = self
            .store
            .write(
                &self.config.queue.reports_folder,
                &name,
                &report.render(),
            )
            .await?;

        // result_doc_id lands in the ledger before archival so an archival
        // failure can resume without re-running research.
        self.ledger
            .update_record(
                &instruction.id,
                RecordUpdate::default()
                    .status(QueueStatus::Complete)
                    .completed_at(Utc::now())
                    .result_doc_id(result_doc_id.clone())
                    .result_folder(self.config.queue.reports_folder.display().to_string())
                    .cases_found(cases_found)
                    .processing_time_ms(timer.elapsed().as_millis() as u64),
            )
            .await
            .map_err(DossierError::from)?;

        self.archive(entry, instruction).await?;

        info!(
            id = %instruction.id,
            doc = %result_doc_id,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "instruction complete"
        );
        Ok(ItemOutcome::Completed {
            instruction_id: instruction.id.clone(),
            result_doc_id,
            cases_found,
        })
    }

    /// Archival-only completion for the re-research guard path.
    async fn complete_and_archive(
        &self,
        entry: &ObjectEntry,
        instruction: &Instruction,
        record: &QueueRecord,
    ) -> Result<()> {
        if record.status != QueueStatus::Complete {
            self.ledger
                .update_record(
                    &instruction.id,
                    RecordUpdate::default()
                        .status(QueueStatus::Complete)
                        .completed_at(Utc::now()),
                )
                .await
                .map_err(DossierError::from)?;
        }
        self.archive(entry, instruction).await
    }

    async fn archive(&self, entry: &ObjectEntry, instruction: &Instruction) -> Result<()> {
        if self.config.queue.test_mode {
            debug!(id = %instruction.id, "test mode: skipping archival");
            return Ok(());
        }
        self.store
            .move_object(&entry.id, &self.config.queue.processed_folder)
            .await?;
        Ok(())
    }

    /// Retry accounting: increment retry_count, record the error, and decide
    /// between Pending (retry later) and Failed (terminal). Failed items are
    /// never archived.
    async fn fail_item(&self, instruction: &Instruction, err: DossierError) -> ItemOutcome {
        error!(id = %instruction.id, error = %err, "instruction failed");

        // A failed read leaves the stored retry count unknown; the update
        // must then omit retry_count entirely, never reset it downward.
        let current_retries = match self.ledger.get_record(&instruction.id).await {
            Ok(record) => Some(record.map_or(0, |r| r.retry_count)),
            Err(e) => {
                error!(id = %instruction.id, error = %e, "could not read ledger during failure handling");
                None
            }
        };

        let retry_count = current_retries.map(|c| (c + 1).min(self.config.queue.max_retries));
        let terminal = !err.is_retryable()
            || retry_count.is_some_and(|c| c >= self.config.queue.max_retries);
        let status = if terminal {
            QueueStatus::Failed
        } else {
            QueueStatus::Pending
        };

        let mut update = RecordUpdate::default()
            .status(status)
            .error_message(err.to_string())
            .last_error_time(Utc::now());
        if let Some(count) = retry_count {
            update = update.retry_count(count);
        }

        if let Err(e) = self.ledger.update_record(&instruction.id, update).await {
            error!(id = %instruction.id, error = %e, "could not record failure in ledger");
        }

        if terminal {
            ItemOutcome::Failed {
                instruction_id: instruction.id.clone(),
                error: err.to_string(),
            }
        } else {
            ItemOutcome::Retried {
                instruction_id: instruction.id.clone(),
                retry_count: retry_count.unwrap_or(0),
                error: err.to_string(),
            }
        }
    }
}

enum Eligibility {
    /// Not processable this cycle; look at the next entry.
    Skip,
    /// Handled entirely during evaluation (stale record went terminal).
    Resolved(ItemOutcome),
    /// Process with this (possibly retry-adjusted) record.
    Process(QueueRecord),
}
