use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::report::decision::{ReportBuildPolicy, ThresholdPolicy};
use crate::report::sync::SyncSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub report_dir: String,

    /// Results directories or glob patterns, relative to the workspace.
    pub results: Vec<String>,

    pub commandline: PathBuf,

    /// Generator config file, relative to the workspace.
    pub config_path: Option<PathBuf>,

    /// Produce a single HTML file instead of an archived report directory.
    pub single_file: bool,

    pub disabled: bool,

    pub report_name: String,

    /// Base URL of the job, used for links in `executor.json`.
    pub job_url: Option<String>,

    pub report_build_policy: ReportBuildPolicy,

    /// System properties handed to the generator through `ALLURE_OPTS`.
    pub properties: IndexMap<String, String>,

    pub result: ThresholdPolicy,

    pub sync: SyncSettings,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_dir: "allure-report".to_string(),
            results: vec!["allure-results".to_string()],
            commandline: PathBuf::from("allure"),
            config_path: None,
            single_file: false,
            disabled: false,
            report_name: "AllureReport".to_string(),
            job_url: None,
            report_build_policy: ReportBuildPolicy::default(),
            properties: IndexMap::new(),
            result: ThresholdPolicy::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.report_dir.trim().is_empty() {
            return Err(config_error("report_dir must not be empty"));
        }
        if self.results.is_empty() || self.results.iter().any(|r| r.trim().is_empty()) {
            return Err(config_error("results must be a non-empty list of paths"));
        }
        if self.sync.poll_interval_secs == 0 || self.sync.timeout_secs == 0 {
            return Err(config_error("sync.poll_interval_secs and sync.timeout_secs must be > 0"));
        }
        if self.sync.poll_interval_secs > self.sync.timeout_secs {
            return Err(config_error("sync.poll_interval_secs must not exceed sync.timeout_secs"));
        }
        let percents = [self.result.unstable_percent, self.result.failure_percent];
        if percents.into_iter().flatten().any(|p| p > 100) {
            return Err(config_error("percent thresholds must be within 0..=100"));
        }
        Ok(())
    }

    pub fn report_dir_name(&self) -> String {
        Path::new(&self.report_dir)
            .file_name()
            .map_or_else(|| self.report_dir.clone(), |name| name.to_string_lossy().to_string())
    }
}

fn config_error(message: &str) -> GateError {
    GateError::Config(message.to_string())
}

/// Loads and validates the config, defaulting when the file is missing.
pub fn load_config(path: &Path) -> Result<ReportConfig> {
    if !path.exists() {
        return Ok(ReportConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let config: ReportConfig = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}
