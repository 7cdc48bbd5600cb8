//! # Mirroring
//!
//! Copies the artifacts and metadata of a resolved closure from source
//! repositories into a destination.
//!
//! ## Overview
//!
//! - [`engine`]: the artifact [`MirrorEngine`]. One [`MirrorTask`] per
//!   selected artifact key, run on a bounded worker pool, verified with a
//!   content comparator and optionally compared against a baseline.
//! - [`metadata`]: copies the closure's units and the source's repository
//!   references as one batch.
//!
//! Task-level failures never surface as `Err`. They are recorded as task
//! outcomes and aggregated into a [`MirrorReport`]; the [`FailurePolicy`]
//! decides whether the first failure stops the remaining tasks.

pub mod engine;
pub mod metadata;

use std::fmt;

use serde::Serialize;

use crate::model::ArtifactKey;
use crate::status::{Severity, Status};

pub use engine::MirrorEngine;
pub use metadata::{mirror_metadata, MetadataSummary};

/// What happens to the remaining tasks after a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop starting new tasks after the first failure.
    #[default]
    FailFast,
    /// Run every task and aggregate the failures.
    BestEffort,
}

impl FailurePolicy {
    pub fn from_fail_on_error(fail_on_error: bool) -> Self {
        if fail_on_error {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::BestEffort
        }
    }

    pub fn is_fail_fast(self) -> bool {
        self == FailurePolicy::FailFast
    }
}

/// Flags of one artifact mirror run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Copy descriptors verbatim, including repository-specific properties.
    /// Otherwise descriptors are rebuilt from the transferred bytes.
    pub raw: bool,
    /// Re-check recorded checksums of artifacts already in the destination.
    pub validate: bool,
    /// Compare artifacts already in the destination with the source.
    pub compare: bool,
    /// Carry custom descriptor properties into rebuilt descriptors.
    pub mirror_properties: bool,
    pub failure_policy: FailurePolicy,
    /// Concurrent transfers; 1 runs tasks sequentially in selection order.
    pub parallelism: usize,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        MirrorOptions {
            raw: true,
            validate: false,
            compare: false,
            mirror_properties: false,
            failure_policy: FailurePolicy::FailFast,
            parallelism: 1,
        }
    }
}

/// Which source artifacts a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSelection {
    /// Every artifact the source holds.
    All,
    /// Exactly these keys. An empty list selects nothing.
    Keys(Vec<ArtifactKey>),
}

/// Result of the primary transfer of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum TaskOutcome {
    /// Bytes and descriptor were written to the destination.
    Copied,
    /// The destination already held the artifact; nothing was checked.
    AlreadyPresent,
    /// The destination already held identical content.
    AlreadyEqual,
    /// The destination holds different content; it was left untouched.
    ContentDrift(String),
    /// Checksums or sizes did not match what the descriptor records.
    VerificationFailed(String),
    /// The comparator could not read one of the streams.
    ComparatorFailed(String),
    /// Reading, writing or committing the artifact failed.
    TransferError(String),
}

impl TaskOutcome {
    pub fn severity(&self) -> Severity {
        match self {
            TaskOutcome::Copied | TaskOutcome::AlreadyPresent | TaskOutcome::AlreadyEqual => {
                Severity::Ok
            }
            TaskOutcome::ContentDrift(_) => Severity::Warning,
            TaskOutcome::VerificationFailed(_)
            | TaskOutcome::ComparatorFailed(_)
            | TaskOutcome::TransferError(_) => Severity::Error,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.severity() == Severity::Error
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Copied => f.write_str("copied"),
            TaskOutcome::AlreadyPresent => f.write_str("already present"),
            TaskOutcome::AlreadyEqual => f.write_str("already present, content equal"),
            TaskOutcome::ContentDrift(detail) => write!(f, "content drift: {}", detail),
            TaskOutcome::VerificationFailed(detail) => write!(f, "verification failed: {}", detail),
            TaskOutcome::ComparatorFailed(detail) => write!(f, "comparator failed: {}", detail),
            TaskOutcome::TransferError(detail) => write!(f, "transfer failed: {}", detail),
        }
    }
}

/// Result of comparing the source artifact against the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum BaselineOutcome {
    Equal,
    /// The baseline has no artifact with this key.
    Absent,
    Different(String),
    /// The baseline could not be consulted; comparison was skipped.
    Skipped(String),
    /// A stream could not be read during comparison.
    Failed(String),
}

impl BaselineOutcome {
    /// Baseline results never exceed a warning.
    pub fn severity(&self) -> Severity {
        match self {
            BaselineOutcome::Equal | BaselineOutcome::Absent => Severity::Ok,
            BaselineOutcome::Skipped(_) => Severity::Info,
            BaselineOutcome::Different(_) | BaselineOutcome::Failed(_) => Severity::Warning,
        }
    }
}

impl fmt::Display for BaselineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineOutcome::Equal => f.write_str("equal to baseline"),
            BaselineOutcome::Absent => f.write_str("not in baseline"),
            BaselineOutcome::Different(detail) => write!(f, "differs from baseline: {}", detail),
            BaselineOutcome::Skipped(reason) => write!(f, "baseline comparison skipped: {}", reason),
            BaselineOutcome::Failed(reason) => write!(f, "baseline comparison failed: {}", reason),
        }
    }
}

/// One artifact of a mirror run and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorTask {
    /// Position of the key in the run's selection.
    pub index: usize,
    pub key: ArtifactKey,
    pub source: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    pub outcome: TaskOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_outcome: Option<BaselineOutcome>,
}

impl MirrorTask {
    pub fn severity(&self) -> Severity {
        let baseline = self
            .baseline_outcome
            .as_ref()
            .map(BaselineOutcome::severity)
            .unwrap_or_default();
        self.outcome.severity().max(baseline)
    }

    /// Human-readable summary, e.g. `plugin,org.lib,1.0.0: copied`.
    pub fn message(&self) -> String {
        match &self.baseline_outcome {
            Some(baseline) if !baseline.severity().is_ok() => {
                format!("{}: {}; {}", self.key, self.outcome, baseline)
            }
            _ => format!("{}: {}", self.key, self.outcome),
        }
    }
}

/// Outcome of an artifact mirror run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    tasks: Vec<MirrorTask>,
    /// Selected tasks that never started.
    not_attempted: usize,
    /// A fail-fast failure stopped the run.
    aborted: bool,
    cancelled: bool,
}

impl MirrorReport {
    pub(crate) fn new(
        mut tasks: Vec<MirrorTask>,
        selected: usize,
        aborted: bool,
        cancelled: bool,
    ) -> Self {
        tasks.sort_by_key(|t| t.index);
        let not_attempted = selected.saturating_sub(tasks.len());
        MirrorReport {
            tasks,
            not_attempted,
            aborted,
            cancelled,
        }
    }

    /// Tasks in selection order.
    pub fn tasks(&self) -> &[MirrorTask] {
        &self.tasks
    }

    pub fn not_attempted(&self) -> usize {
        self.not_attempted
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Maximum task severity; an aborted or cancelled run is an error.
    pub fn severity(&self) -> Severity {
        if self.aborted || self.cancelled {
            return Severity::Error;
        }
        self.tasks
            .iter()
            .map(MirrorTask::severity)
            .max()
            .unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tasks.iter().filter(|t| predicate(&t.outcome)).count()
    }

    pub fn copied(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Copied))
    }

    pub fn failed(&self) -> usize {
        self.count(TaskOutcome::is_failure)
    }

    /// Entries for every non-OK task plus the run-level conditions.
    pub fn status(&self) -> Status {
        let mut status = Status::new();
        for task in &self.tasks {
            let severity = task.severity();
            if !severity.is_ok() {
                status.add(severity, task.message());
            }
        }
        status.merge(self.run_status());
        status
    }

    /// Abort and cancellation entries only.
    pub fn run_status(&self) -> Status {
        let mut status = Status::new();
        if self.aborted {
            status.error(format!(
                "Mirroring aborted after a failure; {} artifacts not attempted",
                self.not_attempted
            ));
        }
        if self.cancelled {
            status.error(format!(
                "Mirroring cancelled; {} artifacts not attempted",
                self.not_attempted
            ));
        }
        status
    }
}

/// Observes a mirror run. Called from worker threads.
pub trait ProgressListener: Send + Sync {
    fn started(&self, _total: usize) {}

    fn task_finished(&self, _task: &MirrorTask) {}

    fn finished(&self, _report: &MirrorReport) {}
}

/// A listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {}
