use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

use allure_gate::config::{load_config, ReportConfig};
use allure_gate::host::local::BuildRecord;
use allure_gate::host::{FsArtifactStore, JobDirectory, LocalNode};
use allure_gate::models::{BuildStatus, BuildSummary};
use allure_gate::report::extractor::{extract_located, ReportVersion};
use allure_gate::report::generator::Commandline;
use allure_gate::report::history::locate;
use allure_gate::report::matrix::MatrixAggregator;
use allure_gate::report::pipeline::{BuildContext, PublishOutcome, Publisher};
use allure_gate::report::results::{resolve_results, stage_cell_results};

#[derive(Parser)]
#[command(name = "allure-gate")]
#[command(author, version, about = "Allure report publisher and build gate", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, store and evaluate the report of one build
    Publish(BuildArgs),

    /// Consume the results of finished matrix cells into one parent report
    Aggregate(BuildArgs),

    /// Copy a matrix cell's results into the parent workspace
    StageCell {
        /// Workspace of the parent (matrix) build
        #[arg(long)]
        parent_workspace: PathBuf,

        /// Workspace of this cell
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Configuration file
        #[arg(short, long, env = "ALLURE_GATE_CONFIG", default_value = "allure-gate.toml")]
        config: PathBuf,
    },

    /// Read the summary of a stored build report
    Summary {
        #[command(flatten)]
        stored: StoredBuildArgs,

        /// Major version of the generator that produced the report
        #[arg(short, long, default_value_t = 2)]
        major: u32,
    },

    /// Find the nearest previous build whose report carries history
    History {
        #[command(flatten)]
        stored: StoredBuildArgs,
    },
}

#[derive(Args)]
struct BuildArgs {
    /// Job directory holding `builds/<number>/`
    #[arg(short, long, env = "ALLURE_GATE_JOB")]
    job: PathBuf,

    /// Build number
    #[arg(short, long, env = "ALLURE_GATE_BUILD")]
    build: u64,

    /// Workspace containing the results directories
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file
    #[arg(short, long, env = "ALLURE_GATE_CONFIG", default_value = "allure-gate.toml")]
    config: PathBuf,

    /// Display name of the build (defaults to "<job> #<build>")
    #[arg(short, long)]
    name: Option<String>,

    /// Result of the build so far
    #[arg(long, value_enum)]
    current_result: Option<CurrentResult>,

    /// When the build started, RFC 3339 (defaults to now)
    #[arg(long)]
    started_at: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct StoredBuildArgs {
    /// Job directory holding `builds/<number>/`
    #[arg(short, long, env = "ALLURE_GATE_JOB")]
    job: PathBuf,

    /// Build number
    #[arg(short, long, env = "ALLURE_GATE_BUILD")]
    build: u64,

    /// Name of the report directory inside the archive
    #[arg(short, long, default_value = "allure-report")]
    report_name: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum CurrentResult {
    Success,
    Unstable,
    Failure,
}

impl From<CurrentResult> for BuildStatus {
    fn from(result: CurrentResult) -> Self {
        match result {
            CurrentResult::Success => Self::Success,
            CurrentResult::Unstable => Self::Unstable,
            CurrentResult::Failure => Self::Failure,
        }
    }
}

impl BuildArgs {
    fn context(&self, job: &JobDirectory) -> BuildContext {
        let display_name = self.name.clone().unwrap_or_else(|| {
            let job_name = self
                .job
                .file_name()
                .map_or_else(|| "build".to_string(), |n| n.to_string_lossy().to_string());
            format!("{job_name} #{}", self.build)
        });

        BuildContext {
            build: job.build(self.build),
            workspace: self.workspace.clone(),
            display_name,
            current: self.current_result.map(BuildStatus::from),
            started_at: self.started_at.unwrap_or_else(Utc::now),
        }
    }
}

fn generator(config: &ReportConfig, workspace: &Path) -> Commandline {
    Commandline::new(&config.commandline)
        .with_config_file(config.config_path.as_ref().map(|path| workspace.join(path)))
        .with_single_file(config.single_file)
        .with_properties(config.properties.clone())
}

fn record(job: &JobDirectory, number: u64, result: Option<BuildStatus>, summary: BuildSummary) -> Result<()> {
    let build = job.build(number);
    job.complete(&build, &BuildRecord { number, result, summary })?;
    info!("Build #{number} recorded as {}", result.unwrap_or(BuildStatus::Success));
    Ok(())
}

/// Fails the process once the outcome has been written out.
fn gate(outcome: Option<&PublishOutcome>) -> Result<()> {
    if let Some(outcome) = outcome {
        if outcome.result == Some(BuildStatus::Failure) {
            bail!("Build #{} is marked {} by its Allure report", outcome.build, BuildStatus::Failure);
        }
    }
    Ok(())
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Publish(args) => {
                info!("Publishing Allure report for build #{}", args.build);

                let config = load_config(&args.config)?;
                let job = JobDirectory::new(&args.job);
                let results = resolve_results(&args.workspace, &config.results)?;
                let commandline = generator(&config, &args.workspace);
                let store = FsArtifactStore;
                let publisher = Publisher::new(&config, &job, &LocalNode, &store, &commandline, args.context(&job));

                let outcome = publisher.publish(&results).await?;
                record(&job, outcome.build, outcome.result, outcome.summary)?;

                self.write_json(&outcome)?;
                gate(Some(&outcome))
            }
            Commands::Aggregate(args) => {
                info!("Aggregating matrix results for build #{}", args.build);

                let config = load_config(&args.config)?;
                let job = JobDirectory::new(&args.job);
                let commandline = generator(&config, &args.workspace);
                let store = FsArtifactStore;
                let context = args.context(&job);
                let current = context.current;
                let publisher = Publisher::new(&config, &job, &LocalNode, &store, &commandline, context);

                let outcome = MatrixAggregator::new(&publisher).aggregate(&args.workspace).await?;
                match &outcome {
                    Some(outcome) => record(&job, outcome.build, outcome.result, outcome.summary)?,
                    None => record(&job, args.build, current, BuildSummary::EMPTY)?,
                }

                self.write_json(&outcome)?;
                gate(outcome.as_ref())
            }
            Commands::StageCell {
                parent_workspace,
                workspace,
                config,
            } => {
                let config = load_config(config)?;
                let results = resolve_results(workspace, &config.results)?;
                let staged = stage_cell_results(&results, parent_workspace)?;
                info!("Cell results staged into: {}", staged.display());

                self.write_json(&json!({ "staged": staged }))
            }
            Commands::Summary { stored, major } => {
                let job = JobDirectory::new(&stored.job);
                let build = job.build(stored.build);
                let found = extract_located(&build, &stored.report_name, ReportVersion::from_major(*major));

                self.write_json(&json!({
                    "build": build.number,
                    "summary_found": found.is_some(),
                    "summary": found.unwrap_or(BuildSummary::EMPTY),
                }))
            }
            Commands::History { stored } => {
                let job = JobDirectory::new(&stored.job);
                let build = job.build(stored.build);
                let history = locate(&job, &build, &stored.report_name);

                self.write_json(&json!({
                    "build": build.number,
                    "history_from": history.as_ref().map(|h| h.build.number),
                    "archive": history.map(|h| h.archive),
                }))
            }
        }
    }

    fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{}", json_output);
        }

        Ok(())
    }
}
