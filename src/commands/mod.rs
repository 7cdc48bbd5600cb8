//! # CLI Command Implementations
//!
//! One module per `unit-mirror` subcommand. Each holds a clap `Args` struct and
//! an `execute` function that builds a [`MirrorConfig`] and calls into the
//! `unit_mirror` library.
//!
//! [`SelectionArgs`] carries the options shared by `mirror` and `slice`:
//! the configuration file, the sources, the roots and the slicing policy.
//! Flags given on the command line override values from the file.

pub mod completions;
pub mod mirror;
pub mod slice;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use unit_mirror::config::{parse_key_value, split_list, MirrorConfig, MirrorKind, SourceRepository};

/// Sources, roots and slicing policy.
#[derive(Args, Debug, Default)]
pub struct SelectionArgs {
    /// YAML file with a complete mirror configuration; flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source repository providing metadata and artifacts (repeatable)
    #[arg(short, long = "source", value_name = "LOCATION")]
    pub sources: Vec<String>,

    /// Source repository providing metadata only (repeatable)
    #[arg(long = "metadata-source", value_name = "LOCATION")]
    pub metadata_sources: Vec<String>,

    /// Source repository providing artifacts only (repeatable)
    #[arg(long = "artifact-source", value_name = "LOCATION")]
    pub artifact_sources: Vec<String>,

    /// Root units as `id[/range]`, comma separated, e.g. `a,b/[1.0,2.0)`
    #[arg(long, value_name = "ROOTS")]
    pub roots: Option<String>,

    /// Target environment property used to evaluate filters (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub environment: Vec<String>,

    /// Do not follow optional requirements
    #[arg(long)]
    pub no_optional: bool,

    /// Follow only one provider per requirement and skip non-greedy requirements
    #[arg(long)]
    pub no_greedy: bool,

    /// Treat filters as false when no environment is given
    #[arg(long)]
    pub no_force_filter: bool,

    /// Follow only requirements pinned to a single version
    #[arg(long)]
    pub strict_only: bool,

    /// Follow only requirements that carry a filter
    #[arg(long)]
    pub filtered_only: bool,

    /// Keep only the highest version of every unit id
    #[arg(long)]
    pub latest_only: bool,

    /// Resolve like an installation would instead of slicing
    #[arg(long)]
    pub install_time: bool,
}

impl SelectionArgs {
    /// The configuration file, or defaults, with these flags applied.
    pub fn load_config(&self) -> Result<MirrorConfig> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => MirrorConfig::default(),
        };

        let sources = self
            .sources
            .iter()
            .map(|l| SourceRepository::new(l.clone(), MirrorKind::Both))
            .chain(
                self.metadata_sources
                    .iter()
                    .map(|l| SourceRepository::new(l.clone(), MirrorKind::Metadata)),
            )
            .chain(
                self.artifact_sources
                    .iter()
                    .map(|l| SourceRepository::new(l.clone(), MirrorKind::Artifacts)),
            );
        config.sources.extend(sources);

        if let Some(roots) = &self.roots {
            config.roots = split_list(roots);
        }

        let policy = &mut config.slicing;
        for pair in &self.environment {
            let (key, value) = parse_key_value(pair)?;
            policy.environment.insert(key, value);
        }
        if self.no_optional {
            policy.include_optional_dependencies = false;
        }
        if self.no_greedy {
            policy.everything_greedy = false;
        }
        if self.no_force_filter {
            policy.force_filter_to = false;
        }
        policy.consider_strict_dependency_only |= self.strict_only;
        policy.follow_only_filtered_requirements |= self.filtered_only;
        policy.latest_version_only |= self.latest_only;
        policy.install_time_like_resolution |= self.install_time;

        Ok(config)
    }
}
