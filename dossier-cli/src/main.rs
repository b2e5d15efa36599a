//! Dossier CLI — queue-driven web research automation.
//!
//! Drives the research queue from the command line: process pending
//! instructions, submit new ones, inspect the ledger, and preview query
//! plans.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use dossier_core::instruction::{Instruction, Priority};
use dossier_core::ledger::{CsvLedger, Ledger, QueueRecord};
use dossier_core::planner::QueryPlanner;
use dossier_core::queue::{ItemOutcome, QueueProcessor, RunOutcome};
use dossier_core::research::DuckDuckGoProvider;
use dossier_core::store::{FsStore, ObjectStore};
use dossier_core::{DossierConfig, load_config};

/// Dossier: research instruction queue processor
#[derive(Parser, Debug)]
#[command(name = "dossier", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Only process TEST_-prefixed instructions and skip archival
    #[arg(long)]
    test_mode: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Process the oldest pending instruction
    Run {
        /// Keep running, one instruction per interval, until Ctrl-C
        #[arg(long)]
        watch: bool,

        /// Seconds between cycles in watch mode
        #[arg(long, default_value = "300")]
        interval_secs: u64,
    },
    /// Show ledger records
    Status {
        /// Show a single instruction by id
        #[arg(short, long)]
        id: Option<String>,
    },
    /// Submit a new instruction to the pending folder
    Submit {
        /// Instruction id (ledger key)
        #[arg(long)]
        id: String,

        /// Category name
        #[arg(long, default_value = "")]
        category: String,

        /// Priority: low, normal, high, urgent
        #[arg(long, default_value = "normal")]
        priority: String,

        /// Research instruction text
        body: String,
    },
    /// Preview the query plan for an instruction document
    Plan {
        /// Path to the instruction document
        document: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "dossier", "dossier")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "dossier.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    if cli.test_mode {
        config.queue.test_mode = true;
    }

    match cli.command {
        Commands::Run {
            watch,
            interval_secs,
        } => run(config, watch, interval_secs).await,
        Commands::Status { id } => status(config, id.as_deref()).await,
        Commands::Submit {
            id,
            category,
            priority,
            body,
        } => submit(config, id, category, priority, body).await,
        Commands::Plan { document } => plan(config, &document).await,
    }
}

fn build_processor(config: &DossierConfig) -> anyhow::Result<QueueProcessor> {
    let provider =
        DuckDuckGoProvider::new(&config.research).context("could not build search provider")?;
    Ok(QueueProcessor::new(
        Arc::new(FsStore::new()),
        Arc::new(CsvLedger::new(config.queue.ledger_path.clone())),
        Arc::new(provider),
        config.clone(),
    ))
}

async fn run(config: DossierConfig, watch: bool, interval_secs: u64) -> anyhow::Result<()> {
    let processor = build_processor(&config)?;

    loop {
        match processor.run_once().await {
            Ok(outcome) => report_outcome(&outcome),
            // In watch mode a failed cycle is logged and retried next tick.
            Err(e) if watch => warn!(error = %e, "cycle failed"),
            Err(e) => return Err(e.into()),
        }

        if !watch {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                return Ok(());
            }
        }
    }
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Idle => println!("Queue is idle."),
        RunOutcome::Processed(ItemOutcome::Completed {
            instruction_id,
            result_doc_id,
            cases_found,
        }) => {
            println!("{instruction_id}: Complete — {cases_found} case(s), report {result_doc_id}");
        }
        RunOutcome::Processed(ItemOutcome::Retried {
            instruction_id,
            retry_count,
            error,
        }) => {
            println!("{instruction_id}: requeued (attempt {retry_count}): {error}");
        }
        RunOutcome::Processed(ItemOutcome::Failed {
            instruction_id,
            error,
        }) => {
            println!("{instruction_id}: Failed — {error}");
        }
    }
}

async fn status(config: DossierConfig, id: Option<&str>) -> anyhow::Result<()> {
    let ledger = CsvLedger::new(config.queue.ledger_path.clone());

    if let Some(id) = id {
        match ledger.get_record(id).await? {
            Some(record) => print_record(&record),
            None => println!("No record for '{id}'."),
        }
        return Ok(());
    }

    let records = ledger.list_records().await?;
    if records.is_empty() {
        println!("Ledger is empty.");
        return Ok(());
    }
    println!(
        "{:<24} {:<12} {:>6} {:>8}  {}",
        "INSTRUCTION", "STATUS", "CASES", "RETRIES", "LAST ERROR"
    );
    for record in records {
        println!(
            "{:<24} {:<12} {:>6} {:>8}  {}",
            record.instruction_id,
            record.status.to_string(),
            record.cases_found,
            record.retry_count,
            truncate(&record.error_message, 60),
        );
    }
    Ok(())
}

fn print_record(record: &QueueRecord) {
    println!("Instruction:  {}", record.instruction_id);
    println!("Status:       {}", record.status);
    if let Some(at) = record.started_at {
        println!("Started:      {}", at.to_rfc3339());
    }
    if let Some(at) = record.completed_at {
        println!("Completed:    {}", at.to_rfc3339());
    }
    if !record.result_doc_id.is_empty() {
        println!("Report:       {}", record.result_doc_id);
        println!("Folder:       {}", record.result_folder);
        println!("Cases:        {}", record.cases_found);
        println!("Elapsed (ms): {}", record.processing_time_ms);
    }
    if record.retry_count > 0 {
        println!("Retries:      {}", record.retry_count);
    }
    if !record.error_message.is_empty() {
        println!("Last error:   {}", record.error_message);
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

async fn submit(
    config: DossierConfig,
    id: String,
    category: String,
    priority: String,
    body: String,
) -> anyhow::Result<()> {
    let priority: Priority = priority.parse().unwrap_or_default();
    let instruction = Instruction {
        id: id.clone(),
        category,
        category_id: String::new(),
        priority,
        body,
        search_parameters: Default::default(),
        output_config: Default::default(),
    };

    let store = FsStore::new();
    let doc_id = store
        .write(
            &config.queue.pending_folder,
            &format!("{id}.txt"),
            &instruction.to_text(),
        )
        .await?;

    let ledger = CsvLedger::new(config.queue.ledger_path.clone());
    ledger
        .update_record(&id, Default::default())
        .await
        .context("could not create ledger record")?;

    println!("Submitted '{id}' as {doc_id}");
    Ok(())
}

async fn plan(config: DossierConfig, document: &Path) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(document)
        .await
        .with_context(|| format!("could not read {}", document.display()))?;
    let name = document
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| document.display().to_string());
    let instruction = Instruction::parse(&text, &name)?;

    let planner = QueryPlanner::new(config.research.max_queries);
    let queries = planner.plan(&instruction)?;

    println!("Instruction {} ({})", instruction.id, instruction.priority);
    for (i, query) in queries.iter().enumerate() {
        println!("  {}. {query}", i + 1);
    }
    Ok(())
}
