//! # Mirror Application
//!
//! [`MirrorApplication`] runs one complete mirror from a [`MirrorConfig`]:
//!
//! 1.  **Validate**: sources present, destination kinds backed by a source,
//!     comparator id and compare exclusions valid. Nothing is opened before
//!     this step passes.
//! 2.  **Open**: sources through the [`RepositoryProvider`] (several sources of
//!     one kind are viewed as a composite), then destinations in the
//!     configured write mode, then the optional baseline. A baseline that
//!     cannot be opened is logged and the run continues without it.
//! 3.  **Resolve roots**: every `id[/range]` root is queried in the metadata
//!     sources; without roots every source unit is a root.
//! 4.  **Slice or plan**: the closure comes from the [`Slicer`], or from a
//!     [`Planner`] when install-time-like resolution is requested.
//! 5.  **Mirror artifacts**: the closure's artifact keys, or every source
//!     artifact when the closure is empty.
//! 6.  **Mirror metadata**: the closure's units and, optionally, the source
//!     references. Skipped when artifact mirroring reported an error under
//!     fail-fast.
//!
//! Mirror and comparator logs are closed on every exit path.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::comparator::{ArtifactComparator, ComparatorRegistry, CompareExclusions};
use crate::config::{MirrorConfig, MirrorKind};
use crate::error::{Error, Result};
use crate::mirror::{
    mirror_metadata, ArtifactSelection, BaselineOutcome, FailurePolicy, MetadataSummary,
    MirrorEngine, MirrorOptions, MirrorReport, MirrorTask, ProgressListener, TaskOutcome,
};
use crate::mirror_log::{open_log, LogGuard};
use crate::model::Unit;
use crate::planner::{resolve_with_planner, Planner, SlicingPlanner};
use crate::repository::{
    ArtifactRepository, CompositeArtifactRepository, CompositeMetadataRepository,
    DirectoryRepositoryProvider, MetadataRepository, RepositoryLookup, RepositoryProvider,
    UnitQuery,
};
use crate::slicer::{Closure, SliceOutcome, Slicer};
use crate::status::{Severity, Status, StatusEntry};

/// Where install-time-like resolution gets its planner from.
#[derive(Clone)]
enum PlannerSource {
    None,
    /// A [`SlicingPlanner`] over the opened metadata sources.
    Local,
    External(Arc<dyn Planner>),
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub closure: Closure,
    pub slice_status: Status,
    /// `None` when the run did not mirror artifacts.
    pub artifacts: Option<MirrorReport>,
    /// `None` when the run did not mirror metadata or skipped it.
    pub metadata: Option<MetadataSummary>,
    /// Every non-OK condition of the run, in the order it occurred.
    pub status: Status,
}

impl RunSummary {
    pub fn severity(&self) -> Severity {
        self.status.severity()
    }
}

/// Orchestrates a mirror run.
pub struct MirrorApplication {
    config: MirrorConfig,
    provider: Arc<dyn RepositoryProvider>,
    comparators: ComparatorRegistry,
    planner: PlannerSource,
}

impl MirrorApplication {
    /// An application reading and writing directory repositories.
    pub fn new(config: MirrorConfig) -> Self {
        MirrorApplication {
            config,
            provider: Arc::new(DirectoryRepositoryProvider),
            comparators: ComparatorRegistry::default(),
            planner: PlannerSource::None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn RepositoryProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_comparators(mut self, comparators: ComparatorRegistry) -> Self {
        self.comparators = comparators;
        self
    }

    /// Uses `planner` for install-time-like resolution.
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = PlannerSource::External(planner);
        self
    }

    /// Uses a [`SlicingPlanner`] over the metadata sources for
    /// install-time-like resolution.
    pub fn with_slicing_planner(mut self) -> Self {
        self.planner = PlannerSource::Local;
        self
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Resolves the closure without writing anything.
    pub fn resolve(&self, cancel: &CancelToken) -> Result<SliceOutcome> {
        if !self.config.has_metadata_sources() {
            return Err(Error::config("No metadata source repositories configured"));
        }
        let metadata = self.open_metadata_sources()?;
        let (roots, mut status) = self.resolve_roots(metadata.as_ref())?;
        let mut outcome = self.compute_closure(&metadata, &roots, cancel)?;
        status.merge(outcome.status);
        outcome.status = status;
        Ok(outcome)
    }

    /// Runs the whole mirror.
    ///
    /// Returns `Err` for configuration errors, repositories that cannot be
    /// opened, lookup and planner failures, cancellation and failed metadata
    /// batches. Everything else is reported in the [`RunSummary`].
    pub fn run(&self, listener: &dyn ProgressListener, cancel: &CancelToken) -> Result<RunSummary> {
        self.config.validate()?;
        let comparator = ArtifactComparator::new(
            self.comparators.get(&self.config.comparator)?,
            CompareExclusions::new(&self.config.compare_exclusions)?,
        );

        let mirror_log = LogGuard::new(match &self.config.log {
            Some(path) => Some(open_log(path, "Mirror log")?),
            None => None,
        });
        let comparator_log = LogGuard::new(match &self.config.comparator_log {
            Some(path) => Some(open_log(
                path,
                &format!("Comparator log ({})", comparator.id()),
            )?),
            None => None,
        });

        let mut summary = RunSummary::default();

        let metadata_source = if self.config.has_metadata_sources() {
            Some(self.open_metadata_sources()?)
        } else {
            None
        };
        let artifact_source = if self.config.mirrors_artifacts() {
            Some(self.open_artifact_sources()?)
        } else {
            None
        };
        let (metadata_destination, artifact_destination) = self.open_destinations()?;
        let baseline = self.open_baseline(&mirror_log, &mut summary.status);

        cancel.check()?;
        if let Some(metadata) = &metadata_source {
            let (roots, root_status) = self.resolve_roots(metadata.as_ref())?;
            if roots.is_empty()
                && self.config.root_specs()?.is_empty()
                && self.config.mirrors_metadata()
                && self.config.kind == MirrorKind::Both
            {
                return Err(Error::Config {
                    message: "No units to mirror".to_string(),
                    hint: Some("The source metadata holds no units".to_string()),
                });
            }
            let outcome = self.compute_closure(metadata, &roots, cancel)?;
            summary.slice_status.merge(root_status);
            summary.slice_status.merge(outcome.status);
            summary.closure = outcome.closure;
        }
        if !summary.slice_status.is_ok() {
            mirror_log.record_status(&summary.slice_status);
        }
        summary.status.merge(summary.slice_status.clone());

        cancel.check()?;
        if let (Some(source), Some(destination)) = (artifact_source, artifact_destination) {
            let selection = if summary.closure.is_empty() {
                ArtifactSelection::All
            } else {
                ArtifactSelection::Keys(summary.closure.artifact_keys())
            };
            let mut engine =
                MirrorEngine::new(source, destination, comparator, self.mirror_options());
            if let Some(baseline) = baseline {
                engine = engine.with_baseline(baseline);
            }
            let logging = LoggingListener {
                mirror_log: &mirror_log,
                comparator_log: &comparator_log,
                verbose: self.config.verbose,
                inner: listener,
            };
            let report = engine.run(&selection, &logging, cancel)?;
            let report_status = report.status();
            mirror_log.record_status(&report.run_status());
            summary.status.merge(report_status);
            summary.artifacts = Some(report);
        }

        cancel.check()?;
        if let (Some(source), Some(destination)) = (&metadata_source, &metadata_destination) {
            let artifacts_failed = summary
                .artifacts
                .as_ref()
                .map(|r| r.severity() == Severity::Error)
                .unwrap_or(false);
            if artifacts_failed && self.config.fail_on_error {
                let entry = StatusEntry::new(
                    Severity::Info,
                    "Metadata mirroring skipped because artifact mirroring failed",
                );
                warn!("{}", entry.message);
                mirror_log.record(&entry);
                summary.status.add(entry.severity, entry.message);
            } else {
                let units = summary.closure.units().to_vec();
                summary.metadata = Some(mirror_metadata(
                    &units,
                    source.as_ref(),
                    destination.as_ref(),
                    self.config.mirror_references,
                )?);
            }
        }

        info!("Mirror finished with status {}", summary.severity());
        Ok(summary)
    }

    fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            raw: self.config.raw,
            validate: self.config.validate,
            compare: self.config.compare,
            mirror_properties: self.config.mirror_properties,
            failure_policy: FailurePolicy::from_fail_on_error(self.config.fail_on_error),
            parallelism: self.config.parallelism,
        }
    }

    fn open_metadata_sources(&self) -> Result<Arc<dyn MetadataRepository>> {
        let mut repositories = Vec::new();
        for source in self.config.sources.iter().filter(|s| s.kind.includes_metadata()) {
            debug!("Opening metadata source {}", source.location);
            repositories.push(self.provider.open_metadata_source(&source.location)?);
        }
        if repositories.len() == 1 {
            return Ok(repositories.remove(0));
        }
        Ok(Arc::new(CompositeMetadataRepository::new(repositories)))
    }

    fn open_artifact_sources(&self) -> Result<Arc<dyn ArtifactRepository>> {
        let mut repositories = Vec::new();
        for source in self.config.sources.iter().filter(|s| s.kind.includes_artifacts()) {
            debug!("Opening artifact source {}", source.location);
            repositories.push(self.provider.open_artifact_source(&source.location)?);
        }
        if repositories.len() == 1 {
            return Ok(repositories.remove(0));
        }
        Ok(Arc::new(CompositeArtifactRepository::new(repositories)))
    }

    #[allow(clippy::type_complexity)]
    fn open_destinations(
        &self,
    ) -> Result<(
        Option<Arc<dyn MetadataRepository>>,
        Option<Arc<dyn ArtifactRepository>>,
    )> {
        let Some(location) = &self.config.destination else {
            return Ok((None, None));
        };
        let mode = self.config.write_mode;
        let metadata = if self.config.mirrors_metadata() {
            Some(self.provider.open_metadata_destination(location, mode)?)
        } else {
            None
        };
        let artifacts = if self.config.mirrors_artifacts() {
            Some(self.provider.open_artifact_destination(location, mode)?)
        } else {
            None
        };
        Ok((metadata, artifacts))
    }

    fn open_baseline(
        &self,
        mirror_log: &LogGuard,
        status: &mut Status,
    ) -> Option<Arc<dyn ArtifactRepository>> {
        if !self.config.mirrors_artifacts() {
            return None;
        }
        let location = self.config.baseline.as_ref()?;
        match self.provider.open_artifact_source(location) {
            Ok(baseline) => Some(baseline),
            Err(e) => {
                let entry = StatusEntry::new(
                    Severity::Warning,
                    format!("Baseline {} not used: {}", location, e),
                );
                warn!("{}", entry.message);
                mirror_log.record(&entry);
                status.add(entry.severity, entry.message);
                None
            }
        }
    }

    /// The units selected by the configured roots, and a warning for every
    /// root that matched nothing.
    fn resolve_roots(&self, metadata: &dyn MetadataRepository) -> Result<(Vec<Arc<Unit>>, Status)> {
        let specs = self.config.root_specs()?;
        let mut status = Status::new();
        if specs.is_empty() {
            return Ok((metadata.units()?, status));
        }

        let mut roots: Vec<Arc<Unit>> = Vec::new();
        for spec in &specs {
            let matches = metadata.query(&UnitQuery::id(spec.id.clone(), spec.range.clone()))?;
            if matches.is_empty() {
                status.warning(format!("Root {} matches no unit in {}", spec, metadata.location()));
            }
            for unit in matches {
                if !roots.iter().any(|r| r.key() == unit.key()) {
                    roots.push(unit);
                }
            }
        }
        debug!("{} roots from {} root specifications", roots.len(), specs.len());
        Ok((roots, status))
    }

    fn compute_closure(
        &self,
        metadata: &Arc<dyn MetadataRepository>,
        roots: &[Arc<Unit>],
        cancel: &CancelToken,
    ) -> Result<SliceOutcome> {
        let policy = &self.config.slicing;
        if !policy.install_time_like_resolution {
            let lookup = RepositoryLookup::new(metadata.as_ref());
            return Slicer::new(&lookup, policy.clone()).slice(roots, cancel);
        }

        let planner: Arc<dyn Planner> = match &self.planner {
            PlannerSource::External(planner) => Arc::clone(planner),
            PlannerSource::Local => Arc::new(SlicingPlanner::new(Arc::clone(metadata))),
            PlannerSource::None => {
                return Err(Error::Config {
                    message: "Install-time-like resolution requires a planner".to_string(),
                    hint: None,
                })
            }
        };
        let mut closure = resolve_with_planner(planner.as_ref(), roots, policy, cancel)?;
        if policy.latest_version_only {
            closure = closure.latest_versions();
        }
        Ok(SliceOutcome {
            closure,
            status: Status::new(),
        })
    }
}

/// Writes task outcomes to the run logs, then forwards to `inner`.
struct LoggingListener<'a> {
    mirror_log: &'a LogGuard,
    comparator_log: &'a LogGuard,
    verbose: bool,
    inner: &'a dyn ProgressListener,
}

impl LoggingListener<'_> {
    fn is_comparison(task: &MirrorTask) -> bool {
        let primary = matches!(
            task.outcome,
            TaskOutcome::AlreadyEqual | TaskOutcome::ContentDrift(_) | TaskOutcome::ComparatorFailed(_)
        );
        let baseline = matches!(
            task.baseline_outcome,
            Some(BaselineOutcome::Equal)
                | Some(BaselineOutcome::Different(_))
                | Some(BaselineOutcome::Failed(_))
        );
        primary || baseline
    }
}

impl ProgressListener for LoggingListener<'_> {
    fn started(&self, total: usize) {
        self.inner.started(total);
    }

    fn task_finished(&self, task: &MirrorTask) {
        let entry = StatusEntry::new(task.severity(), task.message());
        if self.verbose || !entry.severity.is_ok() {
            self.mirror_log.record(&entry);
        }
        if Self::is_comparison(task) {
            self.comparator_log.record(&entry);
        }
        self.inner.task_finished(task);
    }

    fn finished(&self, report: &MirrorReport) {
        self.inner.finished(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceRepository;
    use crate::model::{ArtifactDescriptor, ArtifactKey, Requirement};
    use crate::mirror::NoProgress;
    use crate::planner::{ChangeRequest, ProvisioningPlan};
    use crate::repository::{MemoryArtifactRepository, MemoryMetadataRepository, WriteMode};
    use crate::version::{Version, VersionRange};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn key(id: &str, version: &str) -> ArtifactKey {
        ArtifactKey::new("binary", id, v(version))
    }

    /// Hands out pre-built in-memory repositories by location.
    #[derive(Default)]
    struct MockProvider {
        metadata: HashMap<String, Arc<MemoryMetadataRepository>>,
        artifacts: HashMap<String, Arc<MemoryArtifactRepository>>,
        opened_destinations: Mutex<Vec<(String, WriteMode)>>,
    }

    impl MockProvider {
        fn metadata(&self, location: &str) -> Arc<MemoryMetadataRepository> {
            Arc::clone(&self.metadata[location])
        }

        fn artifacts(&self, location: &str) -> Arc<MemoryArtifactRepository> {
            Arc::clone(&self.artifacts[location])
        }
    }

    impl RepositoryProvider for MockProvider {
        fn open_metadata_source(&self, locator: &str) -> Result<Arc<dyn MetadataRepository>> {
            match self.metadata.get(locator) {
                Some(repo) => Ok(Arc::clone(repo) as Arc<dyn MetadataRepository>),
                None => Err(Error::repository(locator, "no such repository")),
            }
        }

        fn open_artifact_source(&self, locator: &str) -> Result<Arc<dyn ArtifactRepository>> {
            match self.artifacts.get(locator) {
                Some(repo) => Ok(Arc::clone(repo) as Arc<dyn ArtifactRepository>),
                None => Err(Error::repository(locator, "no such repository")),
            }
        }

        fn open_metadata_destination(
            &self,
            locator: &str,
            mode: WriteMode,
        ) -> Result<Arc<dyn MetadataRepository>> {
            self.opened_destinations
                .lock()
                .unwrap()
                .push((locator.to_string(), mode));
            self.open_metadata_source(locator)
        }

        fn open_artifact_destination(
            &self,
            locator: &str,
            mode: WriteMode,
        ) -> Result<Arc<dyn ArtifactRepository>> {
            self.opened_destinations
                .lock()
                .unwrap()
                .push((locator.to_string(), mode));
            self.open_artifact_source(locator)
        }
    }

    /// `src` holds app 1.0 -> lib [1.0,2.0), lib 1.0, lib 1.5 and an unrelated
    /// tool, each with one artifact; `dst` is empty.
    fn provider() -> MockProvider {
        let units = vec![
            Unit::new("app", v("1.0"))
                .requires(Requirement::unit("lib", VersionRange::parse("[1.0,2.0)").unwrap()))
                .with_artifact(key("app", "1.0")),
            Unit::new("lib", v("1.0")).with_artifact(key("lib", "1.0")),
            Unit::new("lib", v("1.5")).with_artifact(key("lib", "1.5")),
            Unit::new("tool", v("3.0")).with_artifact(key("tool", "3.0")),
        ];
        let artifacts = MemoryArtifactRepository::new("src");
        for unit in &units {
            for k in &unit.artifacts {
                artifacts
                    .insert(ArtifactDescriptor::new(k.clone()), k.to_string().into_bytes())
                    .unwrap();
            }
        }

        let mut provider = MockProvider::default();
        provider.metadata.insert(
            "src".to_string(),
            Arc::new(MemoryMetadataRepository::with_units("src", units)),
        );
        provider.artifacts.insert("src".to_string(), Arc::new(artifacts));
        provider
            .metadata
            .insert("dst".to_string(), Arc::new(MemoryMetadataRepository::new("dst")));
        provider
            .artifacts
            .insert("dst".to_string(), Arc::new(MemoryArtifactRepository::new("dst")));
        provider
    }

    fn config() -> MirrorConfig {
        MirrorConfig {
            sources: vec![SourceRepository::new("src", MirrorKind::Both)],
            destination: Some("dst".to_string()),
            parallelism: 1,
            ..MirrorConfig::default()
        }
    }

    fn run(provider: &Arc<MockProvider>, config: MirrorConfig) -> Result<RunSummary> {
        MirrorApplication::new(config)
            .with_provider(Arc::clone(provider) as Arc<dyn RepositoryProvider>)
            .run(&NoProgress, &CancelToken::new())
    }

    #[test]
    fn test_roots_select_closure() {
        let provider = Arc::new(provider());
        let summary = run(
            &provider,
            MirrorConfig {
                roots: vec!["app".to_string()],
                ..config()
            },
        )
        .unwrap();

        assert_eq!(summary.severity(), Severity::Ok);
        assert_eq!(summary.closure.len(), 3);
        assert_eq!(summary.artifacts.as_ref().unwrap().copied(), 3);
        assert_eq!(provider.artifacts("dst").len().unwrap(), 3);
        assert!(!provider.artifacts("dst").contains(&key("tool", "3.0")).unwrap());
        assert_eq!(summary.metadata.unwrap().units, 3);
        assert_eq!(provider.metadata("dst").units().unwrap().len(), 3);
    }

    #[test]
    fn test_no_roots_mirrors_everything() {
        let provider = Arc::new(provider());
        let summary = run(&provider, config()).unwrap();
        assert_eq!(summary.closure.len(), 4);
        assert_eq!(provider.artifacts("dst").len().unwrap(), 4);
    }

    #[test]
    fn test_unmatched_root_is_warning_and_mirrors_all_artifacts() {
        let provider = Arc::new(provider());
        let summary = run(
            &provider,
            MirrorConfig {
                roots: vec!["missing".to_string()],
                kind: MirrorKind::Artifacts,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(summary.severity(), Severity::Warning);
        assert!(summary.closure.is_empty());
        assert_eq!(provider.artifacts("dst").len().unwrap(), 4);
        assert!(summary.metadata.is_none());
    }

    #[test]
    fn test_no_units_with_metadata_destination_is_config_error() {
        let mut provider = provider();
        provider
            .metadata
            .insert("empty".to_string(), Arc::new(MemoryMetadataRepository::new("empty")));
        provider
            .artifacts
            .insert("empty".to_string(), Arc::new(MemoryArtifactRepository::new("empty")));
        let provider = Arc::new(provider);
        let result = run(
            &provider,
            MirrorConfig {
                sources: vec![SourceRepository::new("empty", MirrorKind::Both)],
                ..config()
            },
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_unmatched_root_with_metadata_destination_continues() {
        let provider = Arc::new(provider());
        let summary = run(
            &provider,
            MirrorConfig {
                roots: vec!["missing".to_string()],
                ..config()
            },
        )
        .unwrap();
        assert_eq!(summary.severity(), Severity::Warning);
        assert!(summary.closure.is_empty());
        assert_eq!(provider.artifacts("dst").len().unwrap(), 4);
        assert_eq!(summary.metadata.unwrap().units, 0);
        assert!(provider.metadata("dst").units().unwrap().is_empty());
    }

    #[test]
    fn test_validation_precedes_opening() {
        let provider = Arc::new(provider());
        let result = run(
            &provider,
            MirrorConfig {
                sources: vec![SourceRepository::new("src", MirrorKind::Metadata)],
                ..config()
            },
        );
        assert!(matches!(result, Err(Error::Config { .. })));
        assert!(provider.opened_destinations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_comparator_rejected() {
        let provider = Arc::new(provider());
        let result = run(
            &provider,
            MirrorConfig {
                comparator: "md5".to_string(),
                ..config()
            },
        );
        assert!(matches!(result, Err(Error::UnknownComparator { .. })));
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let provider = Arc::new(provider());
        let result = run(
            &provider,
            MirrorConfig {
                sources: vec![SourceRepository::new("nowhere", MirrorKind::Both)],
                ..config()
            },
        );
        assert!(matches!(result, Err(Error::Repository { .. })));
    }

    #[test]
    fn test_write_mode_reaches_provider() {
        let provider = Arc::new(provider());
        run(
            &provider,
            MirrorConfig {
                write_mode: WriteMode::Clean,
                ..config()
            },
        )
        .unwrap();
        let opened = provider.opened_destinations.lock().unwrap();
        assert_eq!(opened.len(), 2);
        assert!(opened.iter().all(|(loc, mode)| loc == "dst" && *mode == WriteMode::Clean));
    }

    #[test]
    fn test_artifact_failure_skips_metadata_under_fail_fast() {
        let provider = Arc::new(provider());
        provider
            .artifacts("src")
            .fail_reads_of(key("lib", "1.0"))
            .unwrap();
        let summary = run(&provider, config()).unwrap();

        assert_eq!(summary.severity(), Severity::Error);
        assert!(summary.metadata.is_none());
        assert!(provider.metadata("dst").units().unwrap().is_empty());
    }

    #[test]
    fn test_best_effort_still_mirrors_metadata() {
        let provider = Arc::new(provider());
        provider
            .artifacts("src")
            .fail_reads_of(key("lib", "1.0"))
            .unwrap();
        let summary = run(
            &provider,
            MirrorConfig {
                fail_on_error: false,
                ..config()
            },
        )
        .unwrap();

        let report = summary.artifacts.as_ref().unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.copied(), 3);
        assert_eq!(summary.severity(), Severity::Error);
        assert_eq!(summary.metadata.unwrap().units, 4);
    }

    #[test]
    fn test_unopenable_baseline_is_logged_and_ignored() {
        let provider = Arc::new(provider());
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("mirror.log");
        let summary = run(
            &provider,
            MirrorConfig {
                baseline: Some("gone".to_string()),
                log: Some(log.clone()),
                ..config()
            },
        )
        .unwrap();

        assert_eq!(summary.severity(), Severity::Warning);
        assert_eq!(provider.artifacts("dst").len().unwrap(), 4);
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("[WARNING] Baseline gone not used"));
    }

    #[test]
    fn test_verbose_logs_successful_tasks() {
        let provider = Arc::new(provider());
        let temp = tempfile::tempdir().unwrap();
        let quiet = temp.path().join("quiet.log");
        let verbose = temp.path().join("verbose.log");

        run(
            &provider,
            MirrorConfig {
                roots: vec!["tool".to_string()],
                log: Some(quiet.clone()),
                ..config()
            },
        )
        .unwrap();
        let fresh = Arc::new(self::provider());
        run(
            &fresh,
            MirrorConfig {
                roots: vec!["tool".to_string()],
                log: Some(verbose.clone()),
                verbose: true,
                ..config()
            },
        )
        .unwrap();

        assert_eq!(std::fs::read_to_string(&quiet).unwrap(), "Mirror log\n");
        assert!(std::fs::read_to_string(&verbose)
            .unwrap()
            .contains("[OK] binary,tool,3.0.0: copied"));
    }

    #[test]
    fn test_comparator_log_records_comparisons() {
        let provider = Arc::new(provider());
        run(&provider, config()).unwrap();

        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("compare.json");
        run(
            &provider,
            MirrorConfig {
                compare: true,
                comparator_log: Some(log.clone()),
                ..config()
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(content.contains("already present, content equal"));
    }

    #[test]
    fn test_install_time_resolution_requires_planner() {
        let provider = Arc::new(provider());
        let mut config = config();
        config.slicing.install_time_like_resolution = true;
        assert!(matches!(run(&provider, config), Err(Error::Config { .. })));
    }

    #[test]
    fn test_local_planner_selects_single_provider() {
        let provider = Arc::new(provider());
        let mut config = MirrorConfig {
            roots: vec!["app".to_string()],
            ..config()
        };
        config.slicing.install_time_like_resolution = true;
        let summary = MirrorApplication::new(config)
            .with_provider(Arc::clone(&provider) as Arc<dyn RepositoryProvider>)
            .with_slicing_planner()
            .run(&NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(summary.closure.len(), 2);
        assert!(summary.closure.contains("lib", &v("1.5")));
    }

    struct RecordingPlanner {
        requests: Mutex<Vec<usize>>,
    }

    impl Planner for RecordingPlanner {
        fn provisioning_plan(
            &self,
            request: &ChangeRequest,
            _cancel: &CancelToken,
        ) -> Result<ProvisioningPlan> {
            self.requests.lock().unwrap().push(request.additions.len());
            Ok(ProvisioningPlan {
                additions: request.additions.clone(),
                installer_plan: None,
            })
        }
    }

    #[test]
    fn test_external_planner_receives_roots() {
        let provider = Arc::new(provider());
        let planner = Arc::new(RecordingPlanner {
            requests: Mutex::new(Vec::new()),
        });
        let mut config = MirrorConfig {
            roots: vec!["lib".to_string()],
            ..config()
        };
        config.slicing.install_time_like_resolution = true;
        let summary = MirrorApplication::new(config)
            .with_provider(Arc::clone(&provider) as Arc<dyn RepositoryProvider>)
            .with_planner(Arc::clone(&planner) as Arc<dyn Planner>)
            .run(&NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(*planner.requests.lock().unwrap(), vec![2]);
        assert_eq!(summary.closure.len(), 2);
    }

    #[test]
    fn test_resolve_does_not_write() {
        let provider = Arc::new(provider());
        let app = MirrorApplication::new(MirrorConfig {
            roots: vec!["app/[1.0,1.0]".to_string()],
            ..config()
        })
        .with_provider(Arc::clone(&provider) as Arc<dyn RepositoryProvider>);
        let outcome = app.resolve(&CancelToken::new()).unwrap();

        assert_eq!(outcome.closure.len(), 3);
        assert!(outcome.status.is_ok());
        assert!(provider.opened_destinations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_run_returns_error() {
        let provider = Arc::new(provider());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = MirrorApplication::new(config())
            .with_provider(Arc::clone(&provider) as Arc<dyn RepositoryProvider>)
            .run(&NoProgress, &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
