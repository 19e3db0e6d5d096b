use serde::{Deserialize, Serialize};

use crate::models::{BuildStatus, BuildSummary};

/// Fixed "any problem means X" rule used when no threshold is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultMode {
    LeaveAsIs,
    #[default]
    UnstableIfProblems,
    FailureIfProblems,
}

impl ResultMode {
    fn decide(self, summary: &BuildSummary) -> Option<BuildStatus> {
        let has_problems = summary.problems() > 0;
        match self {
            Self::LeaveAsIs => None,
            Self::UnstableIfProblems if has_problems => Some(BuildStatus::Unstable),
            Self::FailureIfProblems if has_problems => Some(BuildStatus::Failure),
            Self::UnstableIfProblems | Self::FailureIfProblems => Some(BuildStatus::Success),
        }
    }
}

/// Numeric cutoffs on problems plus the categorical fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    pub unstable_count: Option<u64>,
    pub failure_count: Option<u64>,
    pub unstable_percent: Option<u32>,
    pub failure_percent: Option<u32>,
    pub mode: ResultMode,
}

impl ThresholdPolicy {
    pub fn with_mode(mode: ResultMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn has_thresholds(&self) -> bool {
        self.unstable_count.is_some()
            || self.failure_count.is_some()
            || self.unstable_percent.is_some()
            || self.failure_percent.is_some()
    }
}

/// Decides the build status; `None` leaves the current result untouched.
///
/// Configured thresholds replace the categorical mode entirely.
#[allow(clippy::cast_precision_loss)]
pub fn decide(summary: &BuildSummary, policy: &ThresholdPolicy) -> Option<BuildStatus> {
    if !policy.has_thresholds() {
        return policy.mode.decide(summary);
    }

    let problems = summary.problems() as f64;

    let by_count = evaluate_pair(
        problems,
        policy.failure_count.map(|t| t as f64),
        policy.unstable_count.map(|t| t as f64),
    );
    let by_percent = evaluate_pair(
        summary.percent(),
        policy.failure_percent.map(f64::from),
        policy.unstable_percent.map(f64::from),
    );

    BuildStatus::worst(by_count, by_percent)
}

fn evaluate_pair(actual: f64, failure: Option<f64>, unstable: Option<f64>) -> Option<BuildStatus> {
    if failure.is_some_and(|threshold| actual >= threshold) {
        return Some(BuildStatus::Failure);
    }
    if unstable.is_some_and(|threshold| actual >= threshold) {
        return Some(BuildStatus::Unstable);
    }
    None
}

/// Which builds get a report generated at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportBuildPolicy {
    #[default]
    Always,
    Unstable,
    Unsuccessful,
}

impl ReportBuildPolicy {
    pub fn title(self) -> &'static str {
        match self {
            Self::Always => "For all builds",
            Self::Unstable => "For all unstable builds",
            Self::Unsuccessful => "For unsuccessful builds",
        }
    }

    /// `current` is the build result so far; `None` counts as success.
    pub fn should_build(self, current: Option<BuildStatus>) -> bool {
        let current = current.unwrap_or(BuildStatus::Success);
        match self {
            Self::Always => true,
            Self::Unstable => current == BuildStatus::Unstable,
            Self::Unsuccessful => current >= BuildStatus::Unstable,
        }
    }
}
