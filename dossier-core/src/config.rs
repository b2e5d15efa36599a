//! Configuration system for Dossier.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config -> environment. Configuration is loaded from
//! `~/.config/dossier/config.toml` and/or `.dossier/config.toml` in the
//! working directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::report::ReportLayout;

/// Top-level configuration for the Dossier pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DossierConfig {
    pub queue: QueueConfig,
    pub research: ResearchConfig,
    pub report: ReportConfig,
}

/// Configuration for the queue processor and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Folder holding pending instruction documents.
    pub pending_folder: PathBuf,
    /// Folder where processed instruction documents are archived.
    pub processed_folder: PathBuf,
    /// Folder that receives generated research reports.
    pub reports_folder: PathBuf,
    /// Path of the tracking ledger file.
    pub ledger_path: PathBuf,
    /// Maximum retries before an instruction is marked Failed.
    pub max_retries: u32,
    /// Age in seconds after which a record stuck in Processing becomes
    /// eligible for retry evaluation.
    pub stale_after_secs: u64,
    /// Only process instructions whose file name starts with `TEST_`,
    /// and never archive them.
    pub test_mode: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pending_folder: PathBuf::from("queue/pending"),
            processed_folder: PathBuf::from("queue/processed"),
            reports_folder: PathBuf::from("queue/reports"),
            ledger_path: PathBuf::from("queue/ledger.csv"),
            max_retries: 3,
            stale_after_secs: 1800,
            test_mode: false,
        }
    }
}

/// Configuration for the research engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Default maximum cases per report when the instruction does not
    /// specify `max_results`.
    pub max_results: usize,
    /// Maximum number of query variants the planner may produce.
    pub max_queries: usize,
    /// Delay between outbound search calls, in milliseconds.
    pub search_delay_ms: u64,
    /// Per-request timeout for the search provider, in seconds.
    pub search_timeout_secs: u64,
    /// User agent sent with search requests.
    pub user_agent: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            max_queries: 6,
            search_delay_ms: 1500,
            search_timeout_secs: 15,
            user_agent: "Dossier/0.3".to_string(),
        }
    }
}

/// Configuration for report synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Layout used when the instruction's OUTPUT_CONFIG does not name one.
    pub default_layout: ReportLayout,
    /// Filename prefix used when the instruction does not specify one.
    pub default_filename_prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_layout: ReportLayout::Detailed,
            default_filename_prefix: "RESEARCH_".to_string(),
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DOSSIER_`)
/// 3. Workspace-local config (`.dossier/config.toml`)
/// 4. User config (`~/.config/dossier/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DossierConfig>,
) -> Result<DossierConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DossierConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "dossier", "dossier") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".dossier").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (DOSSIER_QUEUE__MAX_RETRIES, DOSSIER_RESEARCH__MAX_RESULTS, etc.)
    figment = figment.merge(Env::prefixed("DOSSIER_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DossierConfig::default();
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.research.max_results, 10);
        assert_eq!(config.research.search_delay_ms, 1500);
        assert_eq!(config.report.default_filename_prefix, "RESEARCH_");
        assert!(!config.queue.test_mode);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = DossierConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DossierConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.queue.max_retries, config.queue.max_retries);
        assert_eq!(parsed.research.max_queries, config.research.max_queries);
    }

    #[test]
    fn test_load_config_workspace_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".dossier");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[queue]\nmax_retries = 5\n[research]\nmax_results = 3\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.research.max_results, 3);
        // Untouched sections keep defaults
        assert_eq!(config.research.search_delay_ms, 1500);
    }

    #[test]
    fn test_load_config_overrides_win() {
        let overrides = DossierConfig {
            queue: QueueConfig {
                max_retries: 7,
                ..QueueConfig::default()
            },
            ..DossierConfig::default()
        };
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.queue.max_retries, 7);
    }
}
