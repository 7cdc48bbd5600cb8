//! # Artifact Mirror Engine
//!
//! For every selected artifact key:
//!
//! 1.  If the destination already holds the key and comparison is enabled,
//!     compare source and destination content. Drift is a warning and the
//!     destination is not overwritten; a comparator failure is an error.
//! 2.  If the destination holds the key and validation is enabled, re-check
//!     the destination bytes against the recorded checksum and size.
//! 3.  If the destination holds the key and neither is enabled, skip it.
//! 4.  Otherwise stream the bytes from source to destination, hashing them in
//!     the same pass. The write is only committed once the computed checksum
//!     and size agree with what the source descriptor records.
//! 5.  With a baseline, compare the source content against the baseline's
//!     artifact of the same key. Baseline results never fail a task.
//!
//! Tasks run on a rayon pool of `parallelism` threads. Workers check the
//! abort flag and the cancellation token before starting a task, so in-flight
//! transfers finish but no new ones start after a fail-fast failure.

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;
use sha2::Sha256;

use super::{
    ArtifactSelection, BaselineOutcome, MirrorOptions, MirrorReport, MirrorTask,
    ProgressListener, TaskOutcome,
};
use crate::cancel::CancelToken;
use crate::comparator::{ArtifactComparator, ChecksumAlgorithm, Comparison, DigestingReader};
use crate::defaults::DEFAULT_CHECKSUM;
use crate::error::{Error, Result};
use crate::model::{ArtifactDescriptor, ArtifactKey, PROP_CHECKSUM_PREFIX, PROP_FORMAT, PROP_SIZE};
use crate::repository::ArtifactRepository;

/// Copies artifacts from a source to a destination repository.
pub struct MirrorEngine {
    source: Arc<dyn ArtifactRepository>,
    destination: Arc<dyn ArtifactRepository>,
    baseline: Option<Arc<dyn ArtifactRepository>>,
    comparator: ArtifactComparator,
    options: MirrorOptions,
}

impl MirrorEngine {
    pub fn new(
        source: Arc<dyn ArtifactRepository>,
        destination: Arc<dyn ArtifactRepository>,
        comparator: ArtifactComparator,
        options: MirrorOptions,
    ) -> Self {
        MirrorEngine {
            source,
            destination,
            baseline: None,
            comparator,
            options,
        }
    }

    /// Compares every source artifact against `baseline` as well.
    pub fn with_baseline(mut self, baseline: Arc<dyn ArtifactRepository>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    /// Mirrors `selection` and reports every task.
    ///
    /// Returns `Err` only when the selection itself cannot be determined, the
    /// worker pool cannot be built or the destination index cannot be
    /// written.
    pub fn run(
        &self,
        selection: &ArtifactSelection,
        listener: &dyn ProgressListener,
        cancel: &CancelToken,
    ) -> Result<MirrorReport> {
        let keys = self.selected_keys(selection)?;
        info!(
            "Mirroring {} artifacts from {} to {}",
            keys.len(),
            self.source.location(),
            self.destination.location()
        );
        listener.started(keys.len());

        let abort = AtomicBool::new(false);
        let run_task = |index: usize, key: &ArtifactKey| -> Option<MirrorTask> {
            if abort.load(Ordering::SeqCst) || cancel.is_cancelled() {
                return None;
            }
            let task = self.mirror_artifact(index, key);
            if task.outcome.is_failure() {
                warn!("{}", task.message());
                if self.options.failure_policy.is_fail_fast() {
                    abort.store(true, Ordering::SeqCst);
                }
            } else {
                debug!("{}", task.message());
            }
            listener.task_finished(&task);
            Some(task)
        };

        let tasks: Vec<MirrorTask> = if self.options.parallelism <= 1 {
            let mut tasks = Vec::with_capacity(keys.len());
            for (index, key) in keys.iter().enumerate() {
                match run_task(index, key) {
                    Some(task) => tasks.push(task),
                    None => break,
                }
            }
            tasks
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.parallelism)
                .build()
                .map_err(|e| Error::config(format!("Cannot start mirror workers: {}", e)))?;
            pool.install(|| {
                keys.par_iter()
                    .enumerate()
                    .filter_map(|(index, key)| run_task(index, key))
                    .collect()
            })
        };

        self.destination.flush()?;

        let report = MirrorReport::new(
            tasks,
            keys.len(),
            abort.load(Ordering::SeqCst),
            cancel.is_cancelled(),
        );
        listener.finished(&report);
        Ok(report)
    }

    fn selected_keys(&self, selection: &ArtifactSelection) -> Result<Vec<ArtifactKey>> {
        match selection {
            ArtifactSelection::All => self.source.keys(),
            ArtifactSelection::Keys(keys) => {
                let mut seen = HashSet::new();
                Ok(keys
                    .iter()
                    .filter(|key| seen.insert(*key))
                    .cloned()
                    .collect())
            }
        }
    }

    fn mirror_artifact(&self, index: usize, key: &ArtifactKey) -> MirrorTask {
        let outcome = self.primary_outcome(key);
        let baseline_outcome = self
            .baseline
            .as_ref()
            .map(|baseline| self.compare_baseline(baseline.as_ref(), key));
        MirrorTask {
            index,
            key: key.clone(),
            source: self.source.location().to_string(),
            destination: self.destination.location().to_string(),
            baseline: self.baseline.as_ref().map(|b| b.location().to_string()),
            outcome,
            baseline_outcome,
        }
    }

    fn primary_outcome(&self, key: &ArtifactKey) -> TaskOutcome {
        let source_descriptor = match self.source.descriptor(key) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                return TaskOutcome::TransferError(format!(
                    "not found in source {}",
                    self.source.location()
                ))
            }
            Err(e) => return TaskOutcome::TransferError(e.to_string()),
        };

        let existing = match self.destination.descriptor(key) {
            Ok(existing) => existing,
            Err(e) => return TaskOutcome::TransferError(e.to_string()),
        };

        match existing {
            Some(_) if self.options.compare => self.compare_with_destination(key),
            Some(existing) if self.options.validate => self.validate_existing(&existing),
            Some(_) => TaskOutcome::AlreadyPresent,
            None => self.transfer(&source_descriptor),
        }
    }

    fn compare_with_destination(&self, key: &ArtifactKey) -> TaskOutcome {
        if self.comparator.is_excluded(key) {
            return TaskOutcome::AlreadyEqual;
        }
        let (mut source, mut destination) = match (self.source.read(key), self.destination.read(key)) {
            (Ok(s), Ok(d)) => (s, d),
            (Err(e), _) | (_, Err(e)) => return TaskOutcome::ComparatorFailed(e.to_string()),
        };
        match self.comparator.compare(key, &mut source, &mut destination) {
            Comparison::Equal => TaskOutcome::AlreadyEqual,
            Comparison::Different(detail) => TaskOutcome::ContentDrift(detail),
            Comparison::Failed(reason) => TaskOutcome::ComparatorFailed(reason),
        }
    }

    /// Re-checks destination bytes against the checksums and size recorded in
    /// `descriptor`. Unknown algorithms are ignored.
    fn validate_existing(&self, descriptor: &ArtifactDescriptor) -> TaskOutcome {
        let algorithms: Vec<ChecksumAlgorithm> = ChecksumAlgorithm::ALL
            .into_iter()
            .filter(|alg| descriptor.checksum(alg.name()).is_some())
            .collect();
        if algorithms.is_empty() && descriptor.size().is_none() {
            return TaskOutcome::AlreadyPresent;
        }

        for algorithm in algorithms {
            let expected = descriptor.checksum(algorithm.name()).unwrap_or_default();
            let actual = self
                .destination
                .read(&descriptor.key)
                .and_then(|mut reader| Ok(algorithm.digest_hex(&mut reader)?));
            match actual {
                Ok(actual) if actual.eq_ignore_ascii_case(expected) => {}
                Ok(actual) => {
                    return TaskOutcome::VerificationFailed(format!(
                        "{} recorded {} but content has {}",
                        algorithm.name(),
                        expected,
                        actual
                    ))
                }
                Err(e) => return TaskOutcome::VerificationFailed(e.to_string()),
            }
        }

        if let Some(expected) = descriptor.size() {
            let actual = self
                .destination
                .read(&descriptor.key)
                .and_then(|mut reader| Ok(io::copy(&mut reader, &mut io::sink())?));
            match actual {
                Ok(actual) if actual == expected => {}
                Ok(actual) => {
                    return TaskOutcome::VerificationFailed(format!(
                        "size recorded {} but content has {} bytes",
                        expected, actual
                    ))
                }
                Err(e) => return TaskOutcome::VerificationFailed(e.to_string()),
            }
        }
        TaskOutcome::AlreadyPresent
    }

    fn transfer(&self, source_descriptor: &ArtifactDescriptor) -> TaskOutcome {
        let key = &source_descriptor.key;
        let reader = match self.source.read(key) {
            Ok(reader) => reader,
            Err(e) => return TaskOutcome::TransferError(e.to_string()),
        };
        let mut sink = match self.destination.write(key) {
            Ok(sink) => sink,
            Err(e) => return TaskOutcome::TransferError(e.to_string()),
        };

        let mut digesting = DigestingReader::<_, Sha256>::new(reader);
        if let Err(e) = io::copy(&mut digesting, &mut sink).and_then(|_| sink.flush()) {
            return TaskOutcome::TransferError(e.to_string());
        }
        let size = digesting.bytes_read();
        let sha256 = digesting.finalize_hex();

        if let Some(expected) = source_descriptor.checksum(DEFAULT_CHECKSUM) {
            if !expected.eq_ignore_ascii_case(&sha256) {
                return TaskOutcome::VerificationFailed(format!(
                    "{} recorded {} but transferred content has {}",
                    DEFAULT_CHECKSUM, expected, sha256
                ));
            }
        }
        if let Some(expected) = source_descriptor.size() {
            if expected != size {
                return TaskOutcome::VerificationFailed(format!(
                    "size recorded {} but transferred {} bytes",
                    expected, size
                ));
            }
        }

        let descriptor = self.destination_descriptor(source_descriptor, size, &sha256);
        match sink.commit(descriptor) {
            Ok(()) => TaskOutcome::Copied,
            Err(e) => TaskOutcome::TransferError(e.to_string()),
        }
    }

    /// Descriptor recorded in the destination for a transferred artifact.
    fn destination_descriptor(
        &self,
        source: &ArtifactDescriptor,
        size: u64,
        sha256: &str,
    ) -> ArtifactDescriptor {
        if self.options.raw {
            return source.clone();
        }
        let mut descriptor = ArtifactDescriptor::new(source.key.clone())
            .with_property(PROP_SIZE, size.to_string())
            .with_property(format!("{}{}", PROP_CHECKSUM_PREFIX, DEFAULT_CHECKSUM), sha256);
        if let Some(format) = source.properties.get(PROP_FORMAT) {
            descriptor = descriptor.with_property(PROP_FORMAT, format.clone());
        }
        if self.options.mirror_properties {
            for (name, value) in source.custom_properties() {
                descriptor = descriptor.with_property(name.clone(), value.clone());
            }
        }
        descriptor
    }

    fn compare_baseline(&self, baseline: &dyn ArtifactRepository, key: &ArtifactKey) -> BaselineOutcome {
        match baseline.contains(key) {
            Ok(true) => {}
            Ok(false) => return BaselineOutcome::Absent,
            Err(e) => return BaselineOutcome::Skipped(e.to_string()),
        }
        let mut in_baseline = match baseline.read(key) {
            Ok(reader) => reader,
            Err(e) => return BaselineOutcome::Skipped(e.to_string()),
        };
        let mut in_source = match self.source.read(key) {
            Ok(reader) => reader,
            Err(e) => return BaselineOutcome::Failed(e.to_string()),
        };
        match self.comparator.compare(key, &mut in_source, &mut in_baseline) {
            Comparison::Equal => BaselineOutcome::Equal,
            Comparison::Different(detail) => BaselineOutcome::Different(detail),
            Comparison::Failed(reason) => BaselineOutcome::Failed(reason),
        }
    }
}
