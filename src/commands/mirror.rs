//! # Mirror Command Implementation
//!
//! Implements `unit-mirror mirror`: resolves the closure of the roots and
//! copies its artifacts and metadata into the destination.
//!
//! ## Example
//!
//! ```bash
//! unit-mirror mirror \
//!     --source /srv/repos/release \
//!     --destination /srv/mirror \
//!     --roots 'org.app/[1.0,2.0),org.tools' \
//!     --compare --log mirror.json
//! ```
//!
//! The process exits with status 1 when the run reports an error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use unit_mirror::app::{MirrorApplication, RunSummary};
use unit_mirror::cancel::CancelToken;
use unit_mirror::config::{MirrorConfig, MirrorKind};
use unit_mirror::mirror::{MirrorReport, MirrorTask, ProgressListener, TaskOutcome};
use unit_mirror::output::{emoji, format_entry, severity_label, severity_marker, OutputConfig};
use unit_mirror::repository::WriteMode;
use unit_mirror::status::Severity;

use super::SelectionArgs;

fn parse_kind(value: &str) -> std::result::Result<MirrorKind, String> {
    value.parse().map_err(|e: unit_mirror::error::Error| e.to_string())
}

fn parse_write_mode(value: &str) -> std::result::Result<WriteMode, String> {
    value.parse().map_err(|e: unit_mirror::error::Error| e.to_string())
}

/// Mirror the closure of the root units into a destination repository
#[derive(Args, Debug)]
pub struct MirrorArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Destination repository, created when missing
    #[arg(short, long, value_name = "LOCATION")]
    pub destination: Option<String>,

    /// Restrict the run to one repository kind (both, metadata, artifacts)
    #[arg(long, value_name = "KIND", value_parser = parse_kind)]
    pub kind: Option<MirrorKind>,

    /// Copy artifact descriptors verbatim instead of rebuilding them
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub raw: Option<bool>,

    /// Keep mirroring after a failed artifact
    #[arg(long)]
    pub ignore_errors: bool,

    /// Write successful tasks to the mirror log as well
    #[arg(long)]
    pub verbose: bool,

    /// Compare artifacts already in the destination with the source
    #[arg(long)]
    pub compare: bool,

    /// Compare every source artifact with this baseline repository
    #[arg(long, value_name = "LOCATION")]
    pub compare_against: Option<String>,

    /// Re-check checksums of artifacts already in the destination
    #[arg(long)]
    pub validate: bool,

    /// Copy the source's repository references
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub references: Option<bool>,

    /// Carry custom descriptor properties into rebuilt descriptors
    #[arg(long)]
    pub properties: bool,

    /// Comparator id (sha-256, sha-512, bytes)
    #[arg(long, value_name = "ID")]
    pub comparator: Option<String>,

    /// Artifact keys never compared, as globs over `classifier,id,version`
    #[arg(long = "exclude-compare", value_name = "PATTERN")]
    pub compare_exclusions: Vec<String>,

    /// Mirror log file; `.json` writes JSON lines
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Comparator log file; `.json` writes JSON lines
    #[arg(long, value_name = "PATH")]
    pub comparator_log: Option<PathBuf>,

    /// Destination write mode (append, clean)
    #[arg(long, value_name = "MODE", value_parser = parse_write_mode)]
    pub write_mode: Option<WriteMode>,

    /// Number of concurrent artifact transfers
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Do not show a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl MirrorArgs {
    fn build_config(&self) -> Result<MirrorConfig> {
        let mut config = self.selection.load_config()?;
        if let Some(destination) = &self.destination {
            config.destination = Some(destination.clone());
        }
        if let Some(kind) = self.kind {
            config.kind = kind;
        }
        if let Some(raw) = self.raw {
            config.raw = raw;
        }
        if self.ignore_errors {
            config.fail_on_error = false;
        }
        config.verbose |= self.verbose;
        config.compare |= self.compare;
        config.validate |= self.validate;
        config.mirror_properties |= self.properties;
        if let Some(baseline) = &self.compare_against {
            config.baseline = Some(baseline.clone());
        }
        if let Some(references) = self.references {
            config.mirror_references = references;
        }
        if let Some(comparator) = &self.comparator {
            config.comparator = comparator.clone();
        }
        config
            .compare_exclusions
            .extend(self.compare_exclusions.iter().cloned());
        if self.log.is_some() {
            config.log = self.log.clone();
        }
        if self.comparator_log.is_some() {
            config.comparator_log = self.comparator_log.clone();
        }
        if let Some(mode) = self.write_mode {
            config.write_mode = mode;
        }
        if let Some(jobs) = self.jobs {
            config.parallelism = jobs;
        }
        Ok(config)
    }
}

/// Drives an indicatif bar from mirror events.
struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    fn new(enabled: bool) -> Self {
        let bar = if enabled && console::Term::stderr().features().is_attended() {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        ProgressReporter { bar }
    }
}

impl ProgressListener for ProgressReporter {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn task_finished(&self, task: &MirrorTask) {
        self.bar.set_message(task.key.to_string());
        self.bar.inc(1);
    }

    fn finished(&self, _report: &MirrorReport) {
        self.bar.finish_and_clear();
    }
}

/// Execute the `mirror` command.
pub fn execute(args: MirrorArgs, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config = args.build_config()?;

    println!(
        "{} Mirroring {} source(s) to {}",
        emoji(&out, "📦", "[MIRROR]"),
        config.sources.len(),
        config.destination.as_deref().unwrap_or("<none>")
    );

    let progress = ProgressReporter::new(!args.no_progress);
    let app = MirrorApplication::new(config).with_slicing_planner();
    let summary = app.run(&progress, &CancelToken::new());
    progress.bar.finish_and_clear();
    let summary = summary?;

    print_summary(&out, &summary);

    if summary.severity() == Severity::Error {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(out: &OutputConfig, summary: &RunSummary) {
    println!(
        "{} Resolved {} units",
        emoji(out, "🔍", "[SLICE]"),
        summary.closure.len()
    );

    if let Some(report) = &summary.artifacts {
        let present = report.count(|o| {
            matches!(o, TaskOutcome::AlreadyPresent | TaskOutcome::AlreadyEqual)
        });
        println!(
            "{} Artifacts: {} copied, {} already present, {} failed, {} not attempted",
            emoji(out, "📁", "[ARTIFACTS]"),
            report.copied(),
            present,
            report.failed(),
            report.not_attempted()
        );
    }
    if let Some(metadata) = &summary.metadata {
        println!(
            "{} Metadata: {} units, {} references",
            emoji(out, "📋", "[METADATA]"),
            metadata.units,
            metadata.references
        );
    }

    for entry in summary.status.entries() {
        println!("   {}", format_entry(out, entry));
    }

    let severity = summary.severity();
    println!(
        "{} Mirror finished: {}",
        severity_marker(out, severity),
        severity_label(out, severity)
    );
}
