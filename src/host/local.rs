use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{ArtifactStore, Lineage, Node};
use crate::error::{GateError, Result};
use crate::models::{BuildRef, BuildStatus, BuildSummary};

const BUILDS_DIR: &str = "builds";
const ARTIFACTS_DIR: &str = "archive";
const BUILD_RECORD: &str = "build.json";

/// Record written once a build has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub number: u64,
    pub result: Option<BuildStatus>,
    pub summary: BuildSummary,
}

/// A job laid out on the local filesystem as `<root>/builds/<number>/`.
#[derive(Debug, Clone)]
pub struct JobDirectory {
    root: PathBuf,
}

impl JobDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn build(&self, number: u64) -> BuildRef {
        let root_dir = self.root.join(BUILDS_DIR).join(number.to_string());
        let artifacts_dir = root_dir.join(ARTIFACTS_DIR);
        BuildRef::new(number, root_dir, artifacts_dir)
    }

    pub fn is_completed(&self, build: &BuildRef) -> bool {
        build.root_dir.join(BUILD_RECORD).is_file()
    }

    pub fn record(&self, build: &BuildRef) -> Result<Option<BuildRecord>> {
        match fs::read(build.root_dir.join(BUILD_RECORD)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Marks the build completed.
    pub fn complete(&self, build: &BuildRef, record: &BuildRecord) -> Result<()> {
        fs::create_dir_all(&build.root_dir)?;
        let json = serde_json::to_string_pretty(record)?;
        fs::write(build.root_dir.join(BUILD_RECORD), json)?;
        Ok(())
    }

    fn build_numbers(&self) -> Vec<u64> {
        let Ok(entries) = fs::read_dir(self.root.join(BUILDS_DIR)) else {
            return vec![];
        };

        let mut numbers: Vec<u64> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        numbers.sort_unstable();
        numbers
    }
}

impl Lineage for JobDirectory {
    fn previous_completed(&self, build: &BuildRef) -> Option<BuildRef> {
        self.build_numbers()
            .into_iter()
            .rev()
            .filter(|&number| number < build.number)
            .map(|number| self.build(number))
            .find(|candidate| self.is_completed(candidate))
    }
}

/// Runs node-bound work on this machine's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct LocalNode;

#[async_trait]
impl Node for LocalNode {
    fn name(&self) -> &str {
        "local"
    }

    async fn act<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| GateError::Node(e.to_string()))?
    }
}

/// Stores artifacts in each build's `archive/` directory.
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    fn target(build: &BuildRef, name: &str) -> PathBuf {
        build.artifacts_dir.join(name)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn persist(&self, build: &BuildRef, name: &str, source: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&build.artifacts_dir).await?;

        let target = Self::target(build, name);
        let mut writing = target.clone().into_os_string();
        writing.push(".writing.zip");
        let writing = PathBuf::from(writing);

        tokio::fs::copy(source, &writing).await?;
        if let Err(e) = tokio::fs::rename(&writing, &target).await {
            warn!("Failed to move {} into place: {e}", writing.display());
            let _ = tokio::fs::remove_file(&writing).await;
            return Err(e.into());
        }

        debug!("Stored artifact {} for build #{}", name, build.number);
        Ok(())
    }

    async fn read(&self, build: &BuildRef, name: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(Self::target(build, name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
