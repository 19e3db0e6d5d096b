use std::fs;
use std::path::{Path, PathBuf};

use globset::Glob;
use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::archive::copy_tree;
use crate::error::{GateError, Result};
use crate::models::BuildSummary;

pub const TESTRUN_JSON: &str = "testrun.json";
pub const EXECUTOR_JSON: &str = "executor.json";

const RESULT_FILE_SUFFIX: &str = "-result.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRunInfo {
    pub name: String,
    pub start: i64,
    pub stop: i64,
}

/// Contents of `executor.json`; blank URLs are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub build_order: String,
    pub build_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    pub report_name: String,
}

impl ExecutorInfo {
    pub fn new(build_order: u64, build_name: &str, report_name: &str) -> Self {
        Self {
            name: "allure-gate".to_string(),
            kind: "allure-gate".to_string(),
            build_order: build_order.to_string(),
            build_name: build_name.to_string(),
            url: None,
            build_url: None,
            report_url: None,
            report_name: report_name.to_string(),
        }
    }

    pub fn with_urls(mut self, url: &str, build_url: &str, report_url: &str) -> Self {
        let non_blank = |value: &str| (!value.trim().is_empty()).then(|| value.to_string());
        self.url = non_blank(url);
        self.build_url = non_blank(build_url);
        self.report_url = non_blank(report_url);
        self
    }
}

pub fn write_info<T: Serialize>(results_dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join(file_name);
    fs::write(&path, serde_json::to_vec(value)?)?;
    Ok(path)
}

/// Plain paths are taken as-is, glob patterns match directories below the workspace.
pub fn resolve_results(workspace: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();

    for pattern in patterns {
        if !pattern.contains(['*', '?', '[', '{']) {
            resolved.push(workspace.join(pattern));
            continue;
        }

        let matcher = Glob::new(pattern)
            .map_err(|e| GateError::Config(format!("Invalid results pattern '{pattern}': {e}")))?
            .compile_matcher();

        for entry in WalkDir::new(workspace).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(workspace) else {
                continue;
            };
            if matcher.is_match(relative) && !resolved.contains(&entry.path().to_path_buf()) {
                resolved.push(entry.path().to_path_buf());
            }
        }
    }

    Ok(resolved)
}

/// Writes a summary into a single-file report that came without one.
pub fn materialize_summary(results_dirs: &[PathBuf], report_dir: &Path) -> Result<Option<BuildSummary>> {
    if report_dir.join("widgets/summary.json").is_file() {
        return Ok(None);
    }

    let summary = count_results(results_dirs);
    let wrapped = json!({
        "statistic": {
            "passed": summary.passed(),
            "failed": summary.failed(),
            "broken": summary.broken(),
            "skipped": summary.skipped(),
            "unknown": summary.unknown(),
        }
    });

    for location in ["widgets", "export"] {
        let dir = report_dir.join(location);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("summary.json"), serde_json::to_vec_pretty(&wrapped)?)?;
    }

    Ok(Some(summary))
}

fn count_results(results_dirs: &[PathBuf]) -> BuildSummary {
    let (mut passed, mut failed, mut broken, mut skipped, mut unknown) = (0, 0, 0, 0, 0);

    let result_files = results_dirs
        .iter()
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(std::result::Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(RESULT_FILE_SUFFIX));

    for entry in result_files {
        let status = match fs::read(entry.path())
            .map_err(GateError::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<Value>(&bytes)?))
        {
            Ok(root) => root
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_lowercase),
            Err(e) => {
                debug!("Unable to read result {}: {e}", entry.path().display());
                continue;
            }
        };

        match status.as_deref() {
            Some("passed") => passed += 1,
            Some("failed") => failed += 1,
            Some("broken") => broken += 1,
            Some("skipped") => skipped += 1,
            _ => unknown += 1,
        }
    }

    BuildSummary::new(passed, failed, broken, skipped, unknown)
}

pub fn mirror_report(report_dir: &Path, target: &Path) -> Result<()> {
    if !report_dir.is_dir() {
        return Err(GateError::ReportDirectoryNotFound(report_dir.to_path_buf()));
    }
    copy_tree(report_dir, target)
}

/// Copies a matrix cell's results into a fresh `allure*results` directory of
/// the parent workspace, where the aggregator picks them up.
pub fn stage_cell_results(results_dirs: &[PathBuf], parent_workspace: &Path) -> Result<PathBuf> {
    fs::create_dir_all(parent_workspace)?;
    let staging = tempfile::Builder::new()
        .prefix(super::matrix::CELL_PREFIX)
        .suffix(super::matrix::CELL_SUFFIX)
        .tempdir_in(parent_workspace)?
        .keep();

    for results in results_dirs {
        if !results.is_dir() {
            warn!("Results directory {} does not exist, skipping", results.display());
            continue;
        }
        for entry in WalkDir::new(results).min_depth(1) {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(results) else {
                continue;
            };
            let target = staging.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }

    debug!("Staged cell results into {}", staging.display());
    Ok(staging)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(dir: &Path, name: &str, status: Option<&str>) {
        fs::create_dir_all(dir).unwrap();
        let body = match status {
            Some(status) => json!({ "name": name, "status": status }),
            None => json!({ "name": name }),
        };
        fs::write(dir.join(format!("{name}-result.json")), body.to_string()).unwrap();
    }

    #[test]
    fn test_testrun_info_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TESTRUN_JSON), "Hello").unwrap();
        let info = TestRunInfo {
            name: "some-build-name".to_string(),
            start: 123,
            stop: 321,
        };

        let path = write_info(dir.path(), TESTRUN_JSON, &info).unwrap();

        let written: Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(written, json!({"name": "some-build-name", "start": 123, "stop": 321}));
    }

    #[test]
    fn test_executor_info_omits_blank_urls() {
        let info = ExecutorInfo::new(7, "app #7", "AllureReport").with_urls("", "http://ci/app/7", " ");

        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["buildOrder"], "7");
        assert_eq!(value["type"], "allure-gate");
        assert_eq!(value["buildUrl"], "http://ci/app/7");
        assert!(value.get("url").is_none());
        assert!(value.get("reportUrl").is_none());
    }

    #[test]
    fn test_materialize_summary_counts_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("allure-results");
        result(&results, "a", Some("passed"));
        result(&results, "b", Some("FAILED"));
        result(&results.join("nested"), "c", Some("broken"));
        result(&results, "d", Some("weird"));
        result(&results, "e", None);
        fs::write(results.join("f-container.json"), "{}").unwrap();
        let report = dir.path().join("allure-report");

        let summary = materialize_summary(&[results], &report).unwrap();

        assert_eq!(summary, Some(BuildSummary::new(1, 1, 1, 0, 2)));
        let written = fs::read(report.join("export/summary.json")).unwrap();
        assert_eq!(
            crate::report::extractor::parse_summary(&written).unwrap(),
            BuildSummary::new(1, 1, 1, 0, 2)
        );
    }

    #[test]
    fn test_materialize_summary_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("allure-report");
        fs::create_dir_all(report.join("widgets")).unwrap();
        fs::write(report.join("widgets/summary.json"), "{}").unwrap();

        assert_eq!(materialize_summary(&[], &report).unwrap(), None);
        assert!(!report.join("export").exists());
    }

    #[test]
    fn test_resolve_results_plain_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("module-a/allure-results")).unwrap();
        fs::create_dir_all(dir.path().join("module-b/allure-results")).unwrap();
        fs::create_dir_all(dir.path().join("module-b/other")).unwrap();

        let mut resolved = resolve_results(
            dir.path(),
            &["target/results".to_string(), "*/allure-results".to_string()],
        )
        .unwrap();
        resolved.sort();

        assert_eq!(
            resolved,
            vec![
                dir.path().join("module-a/allure-results"),
                dir.path().join("module-b/allure-results"),
                dir.path().join("target/results"),
            ]
        );
    }

    #[test]
    fn test_stage_cell_results() {
        let dir = tempfile::tempdir().unwrap();
        let cell = dir.path().join("cell/allure-results");
        result(&cell, "a", Some("passed"));
        let parent = dir.path().join("parent");

        let staged = stage_cell_results(&[cell], &parent).unwrap();

        let name = staged.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("allure") && name.ends_with("results"));
        assert!(staged.join("a-result.json").is_file());
    }
}
