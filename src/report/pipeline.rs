use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{info, warn};
use serde::Serialize;

use super::decision::decide;
use super::extractor::{extract_located, ReportVersion};
use super::generator::{GenerateRequest, ReportGenerator};
use super::history::{copy_history, locate, HistoryRef};
use super::matrix::ReportRun;
use super::results::{
    materialize_summary, mirror_report, write_info, ExecutorInfo, TestRunInfo, EXECUTOR_JSON,
    TESTRUN_JSON,
};
use super::sync::{ArchiveSync, SyncedArchive};
use crate::config::ReportConfig;
use crate::error::Result;
use crate::host::{ArtifactStore, Lineage, Node};
use crate::models::{BuildRef, BuildStatus, BuildSummary, REPORT_ARCHIVE_NAME};

/// The build being published.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub build: BuildRef,
    pub workspace: PathBuf,
    pub display_name: String,
    /// Result of the build before the report is taken into account.
    pub current: Option<BuildStatus>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishOutcome {
    pub build: u64,
    pub generated: bool,
    pub history_from: Option<u64>,
    pub archive: Option<SyncedArchive>,
    pub summary: BuildSummary,
    pub summary_found: bool,
    pub result: Option<BuildStatus>,
}

impl PublishOutcome {
    fn skipped(build: &BuildRef, current: Option<BuildStatus>) -> Self {
        Self {
            build: build.number,
            generated: false,
            history_from: None,
            archive: None,
            summary: BuildSummary::EMPTY,
            summary_found: false,
            result: current,
        }
    }
}

/// Runs the report pipeline for one build: seed history, generate, move
/// the report to storage, read its summary and decide the build status.
pub struct Publisher<'a, L, N, S, G> {
    config: &'a ReportConfig,
    lineage: &'a L,
    node: &'a N,
    store: &'a S,
    generator: &'a G,
    context: BuildContext,
}

impl<'a, L, N, S, G> Publisher<'a, L, N, S, G>
where
    L: Lineage + Sync,
    N: Node,
    S: ArtifactStore,
    G: ReportGenerator,
{
    pub fn new(
        config: &'a ReportConfig,
        lineage: &'a L,
        node: &'a N,
        store: &'a S,
        generator: &'a G,
        context: BuildContext,
    ) -> Self {
        Self {
            config,
            lineage,
            node,
            store,
            generator,
            context,
        }
    }

    pub async fn publish(&self, results: &[PathBuf]) -> Result<PublishOutcome> {
        let build = &self.context.build;

        if self.config.disabled {
            info!("Allure report is disabled.");
            return Ok(PublishOutcome::skipped(build, self.context.current));
        }

        let policy = self.config.report_build_policy;
        if !policy.should_build(self.context.current) {
            info!("Allure report generation rejected by policy [{}]", policy.title());
            return Ok(PublishOutcome::skipped(build, self.context.current));
        }

        let report_name = self.config.report_dir_name();
        let history = locate(self.lineage, build, &report_name);
        self.prepare_results(results, history.as_ref()).await?;

        let major = self.generator.major_version().await;
        let report_path = self.context.workspace.join(&self.config.report_dir);
        self.generator
            .generate(&GenerateRequest {
                major,
                results: results.to_vec(),
                output: report_path.clone(),
                working_dir: self.context.workspace.clone(),
            })
            .await?;

        let archive = self.store_report(results, report_path, &report_name).await?;

        let found = extract_located(build, &report_name, ReportVersion::from_major(major));
        let summary = found.unwrap_or(BuildSummary::EMPTY);
        if found.is_none() {
            warn!("No Allure summary found for build #{}", build.number);
        }

        let result = decide(&summary, &self.config.result)
            .map_or(self.context.current, |decided| {
                BuildStatus::worst(self.context.current, Some(decided))
            });
        info!(
            "Build #{} summary: {} passed, {} problems of {} tests; result {}",
            build.number,
            summary.passed(),
            summary.problems(),
            summary.total(),
            result.map_or_else(|| "unchanged".to_string(), |r| r.to_string())
        );

        Ok(PublishOutcome {
            build: build.number,
            generated: true,
            history_from: history.map(|h| h.build.number),
            archive,
            summary,
            summary_found: found.is_some(),
            result,
        })
    }

    /// Seeds history and run metadata into every results directory.
    async fn prepare_results(&self, results: &[PathBuf], history: Option<&HistoryRef>) -> Result<()> {
        let build = &self.context.build;
        let test_run = TestRunInfo {
            name: self.context.display_name.clone(),
            start: self.context.started_at.timestamp_millis(),
            stop: Utc::now().timestamp_millis(),
        };
        let executor = self.executor_info();

        let tasks = results.iter().cloned().map(|dir| {
            let history = history.cloned();
            let test_run = test_run.clone();
            let executor = executor.clone();
            self.node.act(move || {
                if let Some(history) = &history {
                    if let Err(e) = copy_history(history, &dir) {
                        warn!("Cannot copy history information into {}: {e}", dir.display());
                    }
                }
                write_info(&dir, TESTRUN_JSON, &test_run)?;
                write_info(&dir, EXECUTOR_JSON, &executor)?;
                Ok(())
            })
        });
        try_join_all(tasks).await?;

        if history.is_none() {
            info!("Cannot find a history information about previous builds of #{}", build.number);
        }
        Ok(())
    }

    fn executor_info(&self) -> ExecutorInfo {
        let build = &self.context.build;
        let info = ExecutorInfo::new(build.number, &self.context.display_name, &self.config.report_name);
        match &self.config.job_url {
            Some(job_url) => {
                let job_url = job_url.trim_end_matches('/');
                let build_url = format!("{job_url}/{}/", build.number);
                let report_url = format!("{build_url}allure");
                info.with_urls(job_url, &build_url, &report_url)
            }
            None => info,
        }
    }

    /// Mirrors the report into the build's storage and, unless it is a
    /// single-file report, archives it to the artifact store.
    async fn store_report(
        &self,
        results: &[PathBuf],
        report_path: PathBuf,
        report_name: &str,
    ) -> Result<Option<SyncedArchive>> {
        let build = &self.context.build;
        let mirror = build.root_dir.join(report_name);
        let single_file = self.config.single_file;
        let results = results.to_vec();

        self.node
            .act(move || {
                if single_file {
                    materialize_summary(&results, &report_path)?;
                }
                mirror_report(&report_path, &mirror)
            })
            .await?;
        info!("Allure report copied to build #{}", build.number);

        if single_file {
            return Ok(None);
        }

        let sync = ArchiveSync::new(self.node, self.store, self.config.sync);
        let synced = sync
            .sync(build, &self.context.workspace, &self.config.report_dir, REPORT_ARCHIVE_NAME)
            .await?;
        Ok(Some(synced))
    }
}

#[async_trait]
impl<'a, L, N, S, G> ReportRun for Publisher<'a, L, N, S, G>
where
    L: Lineage + Sync,
    N: Node,
    S: ArtifactStore,
    G: ReportGenerator,
{
    type Output = PublishOutcome;

    async fn run(&self, results: &[PathBuf]) -> Result<PublishOutcome> {
        self.publish(results).await
    }
}
