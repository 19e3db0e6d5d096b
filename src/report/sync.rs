use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::archive::{create_archive, sha1_bytes, sha1_file};
use crate::error::{GateError, Result};
use crate::host::{ArtifactStore, Node};
use crate::models::BuildRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            timeout_secs: 60,
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedArchive {
    pub name: String,
    pub sha1: String,
    pub polls: u32,
}

/// Zips a report on its node, stores it, and polls the stored copy until
/// its SHA-1 matches.
pub struct ArchiveSync<'a, N, S> {
    node: &'a N,
    store: &'a S,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a, N: Node, S: ArtifactStore> ArchiveSync<'a, N, S> {
    pub fn new(node: &'a N, store: &'a S, settings: SyncSettings) -> Self {
        Self {
            node,
            store,
            poll_interval: settings.poll_interval(),
            timeout: settings.timeout(),
        }
    }

    /// Overrides the settings with sub-second durations.
    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    pub async fn archive(&self, workspace: &Path, report_dir: &str, archive_name: &str) -> Result<PathBuf> {
        let workspace = workspace.to_path_buf();
        let report_dir = report_dir.to_string();
        let archive_name = archive_name.to_string();

        let archive = self
            .node
            .act(move || create_archive(&workspace, &report_dir, &archive_name))
            .await?;
        debug!("Created {} on node {}", archive.display(), self.node.name());
        Ok(archive)
    }

    pub async fn publish(&self, build: &BuildRef, archive: &Path, name: &str) -> Result<()> {
        self.store.persist(build, name, archive).await?;
        info!("Allure artifact archived for build #{}", build.number);
        Ok(())
    }

    /// Polls the stored copy until its digest matches the local archive.
    pub async fn verify(&self, build: &BuildRef, archive: &Path, name: &str) -> Result<SyncedArchive> {
        let local = archive.to_path_buf();
        let expected = self.node.act(move || sha1_file(&local)).await?;

        let deadline = Instant::now() + self.timeout;
        let mut actual = None;
        let mut polls = 0;

        loop {
            polls += 1;
            match self.store.read(build, name).await {
                Ok(Some(bytes)) => {
                    let digest = sha1_bytes(&bytes);
                    if digest == expected {
                        debug!("Stored {name} matches local sha1 {expected} after {polls} poll(s)");
                        return Ok(SyncedArchive {
                            name: name.to_string(),
                            sha1: expected,
                            polls,
                        });
                    }
                    debug!("Stored {name} has sha1 {digest}, waiting for {expected}");
                    actual = Some(digest);
                }
                Ok(None) => debug!("Stored {name} has not landed yet"),
                Err(e) => warn!("Failed to read stored {name}: {e}"),
            }

            if Instant::now() >= deadline {
                return Err(GateError::DigestTimeout {
                    name: name.to_string(),
                    expected,
                    actual,
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Archive, publish and verify, then remove the local archive and
    /// the uncompressed report directory whatever the outcome.
    pub async fn sync(
        &self,
        build: &BuildRef,
        workspace: &Path,
        report_dir: &str,
        name: &str,
    ) -> Result<SyncedArchive> {
        let outcome = self.transfer(build, workspace, report_dir, name).await;
        self.cleanup(workspace.join(name), workspace.join(report_dir)).await;
        outcome
    }

    async fn transfer(
        &self,
        build: &BuildRef,
        workspace: &Path,
        report_dir: &str,
        name: &str,
    ) -> Result<SyncedArchive> {
        let archive = self.archive(workspace, report_dir, name).await?;
        self.publish(build, &archive, name).await?;
        self.verify(build, &archive, name).await
    }

    async fn cleanup(&self, archive: PathBuf, report: PathBuf) {
        let removed = self
            .node
            .act(move || {
                if archive.is_file() {
                    std::fs::remove_file(&archive)?;
                }
                if report.is_dir() {
                    std::fs::remove_dir_all(&report)?;
                }
                Ok(())
            })
            .await;

        if let Err(e) = removed {
            warn!("Can't clean up Allure report files: {e}");
        }
    }
}
