use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};

use crate::error::Result;

/// Per-cell results directories are named `allure*results`.
pub const CELL_PREFIX: &str = "allure";
pub const CELL_SUFFIX: &str = "results";

/// Report generation over a set of results directories, shaped like a
/// single-configuration build with several results paths.
#[async_trait]
pub trait ReportRun: Send + Sync {
    type Output: Send;

    async fn run(&self, results: &[PathBuf]) -> Result<Self::Output>;
}

/// All cells must have finished before `aggregate` is called.
pub struct MatrixAggregator<'a, R> {
    run: &'a R,
}

impl<'a, R: ReportRun> MatrixAggregator<'a, R> {
    pub fn new(run: &'a R) -> Self {
        Self { run }
    }

    /// Runs report generation once over every cell directory, then deletes
    /// the consumed directories. `Ok(None)` when there was nothing to consume.
    pub async fn aggregate(&self, parent_workspace: &Path) -> Result<Option<R::Output>> {
        let cells = scan_cells(parent_workspace)?;
        if cells.is_empty() {
            info!("No matrix cell results in {}", parent_workspace.display());
            return Ok(None);
        }

        info!("Aggregating {} matrix cell result directories", cells.len());
        let output = self.run.run(&cells).await?;

        for cell in &cells {
            if let Err(e) = fs::remove_dir_all(cell) {
                warn!("Can't delete directory [{}]: {e}", cell.display());
            }
        }

        Ok(Some(output))
    }
}

pub fn scan_cells(workspace: &Path) -> Result<Vec<PathBuf>> {
    if !workspace.is_dir() {
        return Ok(vec![]);
    }

    let mut cells: Vec<PathBuf> = fs::read_dir(workspace)?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(CELL_PREFIX) && name.contains(CELL_SUFFIX)
        })
        .map(|entry| entry.path())
        .collect();
    cells.sort();
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRun {
        calls: Mutex<Vec<Vec<PathBuf>>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportRun for RecordingRun {
        type Output = usize;

        async fn run(&self, results: &[PathBuf]) -> Result<usize> {
            self.calls.lock().unwrap().push(results.to_vec());
            if self.fail {
                return Err(GateError::Generator { code: Some(1) });
            }
            Ok(results.len())
        }
    }

    #[tokio::test]
    async fn test_no_cells_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let run = RecordingRun::default();

        let output = MatrixAggregator::new(&run).aggregate(dir.path()).await.unwrap();

        assert_eq!(output, None);
        assert!(run.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregates_once_and_deletes_cells() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["allure123results", "allure-results", "allure-report", "results"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("allure-results.txt"), "file").unwrap();
        let run = RecordingRun::default();
        let aggregator = MatrixAggregator::new(&run);

        let output = aggregator.aggregate(dir.path()).await.unwrap();

        assert_eq!(output, Some(2));
        assert_eq!(
            *run.calls.lock().unwrap(),
            vec![vec![dir.path().join("allure-results"), dir.path().join("allure123results")]]
        );
        assert!(!dir.path().join("allure123results").exists());
        assert!(dir.path().join("allure-report").exists());

        assert_eq!(aggregator.aggregate(dir.path()).await.unwrap(), None);
        assert_eq!(run.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_generation_keeps_cells() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("allure9results")).unwrap();
        let run = RecordingRun {
            fail: true,
            ..RecordingRun::default()
        };

        let result = MatrixAggregator::new(&run).aggregate(dir.path()).await;

        assert!(result.is_err());
        assert!(dir.path().join("allure9results").exists());
    }
}
