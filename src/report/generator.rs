use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::process::Command;

use crate::error::{GateError, Result};

/// One invocation of the external report generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// As reported by [`ReportGenerator::major_version`].
    pub major: u32,
    pub results: Vec<PathBuf>,
    pub output: PathBuf,
    pub working_dir: PathBuf,
}

/// Turns raw result directories into a browsable report.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Major version of the generator, used to pick summary layouts.
    async fn major_version(&self) -> u32;

    /// Fails with [`GateError::Generator`] on a non-zero exit.
    async fn generate(&self, request: &GenerateRequest) -> Result<()>;
}

/// The `allure` command line.
#[derive(Debug, Clone)]
pub struct Commandline {
    executable: PathBuf,
    config_file: Option<PathBuf>,
    single_file: bool,
    properties: IndexMap<String, String>,
}

impl Commandline {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config_file: None,
            single_file: false,
            properties: IndexMap::new(),
        }
    }

    pub fn with_config_file(mut self, config_file: Option<PathBuf>) -> Self {
        self.config_file = config_file;
        self
    }

    pub fn with_single_file(mut self, single_file: bool) -> Self {
        self.single_file = single_file;
        self
    }

    pub fn with_properties(mut self, properties: IndexMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn arguments(&self, major: u32, results: &[PathBuf], output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["generate".into()];
        args.extend(results.iter().map(|path| path.as_os_str().to_owned()));

        if major == 1 {
            args.extend(["-o".into(), output.as_os_str().to_owned()]);
            return args;
        }

        args.extend(["-c".into(), "-o".into(), output.as_os_str().to_owned()]);
        if let Some(config_file) = &self.config_file {
            args.extend(["--config".into(), config_file.as_os_str().to_owned()]);
        }
        if self.single_file {
            args.push("--single-file".into());
        }
        args
    }

    /// `ALLURE_OPTS` value carrying the configured system properties.
    pub fn allure_opts(&self) -> String {
        self.properties
            .iter()
            .map(|(key, value)| format!("\"-D{key}={value}\""))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// First integer in a version string, 2 when there is none.
pub fn parse_major(version: &str) -> u32 {
    version
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
        .and_then(|part| part.parse().ok())
        .unwrap_or(2)
}

#[async_trait]
impl ReportGenerator for Commandline {
    async fn major_version(&self) -> u32 {
        match Command::new(&self.executable).arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                debug!("Allure CLI version: {}", version.trim());
                parse_major(&version)
            }
            Ok(output) => {
                warn!("Allure CLI version check exited with {}", output.status);
                2
            }
            Err(e) => {
                warn!("Unable to detect Allure CLI version: {e}");
                2
            }
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<()> {
        let args = self.arguments(request.major, &request.results, &request.output);
        info!("Using Allure CLI: {}", self.executable.display());

        let status = Command::new(&self.executable)
            .args(&args)
            .env("ALLURE_OPTS", self.allure_opts())
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(GateError::Generator {
                code: status.code(),
            });
        }
        info!("Allure report was successfully generated.");
        Ok(())
    }
}
