use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const REPORT_ARCHIVE_NAME: &str = "allure-report.zip";

/// `BuildSummary::EMPTY` is what extraction returns when nothing could be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    passed: u64,
    failed: u64,
    broken: u64,
    skipped: u64,
    unknown: u64,
}

impl BuildSummary {
    pub const EMPTY: Self = Self::new(0, 0, 0, 0, 0);

    pub const fn new(passed: u64, failed: u64, broken: u64, skipped: u64, unknown: u64) -> Self {
        Self {
            passed,
            failed,
            broken,
            skipped,
            unknown,
        }
    }

    pub const fn passed(&self) -> u64 {
        self.passed
    }

    pub const fn failed(&self) -> u64 {
        self.failed
    }

    pub const fn broken(&self) -> u64 {
        self.broken
    }

    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    pub const fn unknown(&self) -> u64 {
        self.unknown
    }

    pub const fn problems(&self) -> u64 {
        self.failed.saturating_add(self.broken)
    }

    pub const fn total(&self) -> u64 {
        self.problems()
            .saturating_add(self.passed)
            .saturating_add(self.skipped)
            .saturating_add(self.unknown)
    }

    /// Share of problems in percent, `0.0` for an empty report.
    pub fn percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let percent = (self.problems() as f64 * 100.0) / total as f64;
        percent
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Final status of a build, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Success,
    Unstable,
    Failure,
}

impl BuildStatus {
    /// Worst of two optional partial results; `None` is better than any status.
    pub fn worst(first: Option<Self>, second: Option<Self>) -> Option<Self> {
        first.max(second)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "SUCCESS",
            Self::Unstable => "UNSTABLE",
            Self::Failure => "FAILURE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRef {
    pub number: u64,
    /// Private per-build storage (unpacked reports, build record).
    pub root_dir: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl BuildRef {
    pub fn new(number: u64, root_dir: impl Into<PathBuf>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            number,
            root_dir: root_dir.into(),
            artifacts_dir: artifacts_dir.into(),
        }
    }
}

/// Where a generated report of a build can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLocation {
    /// Entries rooted at `root/` inside the build's report archive.
    Archive { archive: PathBuf, root: String },
    /// Unpacked report directory under the build's private storage.
    Directory(PathBuf),
}

impl ReportLocation {
    pub fn archive(build: &BuildRef, report_name: &str) -> Self {
        Self::Archive {
            archive: build.artifacts_dir.join(REPORT_ARCHIVE_NAME),
            root: report_name.to_string(),
        }
    }

    pub fn directory(build: &BuildRef, report_name: &str) -> Self {
        Self::Directory(build.root_dir.join(report_name))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Archive { archive, .. } => archive,
            Self::Directory(dir) => dir,
        }
    }
}
