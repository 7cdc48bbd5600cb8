//! # Mirror Configuration
//!
//! This module defines [`MirrorConfig`], the complete description of one
//! mirror run, and the parsing of its YAML file form and of root
//! specifications.
//!
//! ## File format
//!
//! ```yaml
//! sources:
//!   - /srv/repos/release          # metadata and artifacts
//!   - location: file:///srv/extra
//!     kind: artifacts
//! destination: /srv/mirror
//! roots: ["org.app/[1.0,2.0)", "org.tools"]
//! compare: true
//! baseline: /srv/repos/previous
//! write_mode: clean
//! slicing:
//!   environment: { os: linux, ws: gtk, arch: x86_64 }
//!   include_optional_dependencies: false
//! ```
//!
//! Every key is optional; defaults match [`MirrorConfig::default`].
//!
//! ## Root specifications
//!
//! A root is `id` or `id/range`. Lists are comma separated; a token that
//! opens a range (`[` or `(`) is re-joined with the following tokens until
//! the range closes, so `a,b/[1.0,2.0),c` yields three roots.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::defaults::{default_parallelism, DEFAULT_COMPARATOR};
use crate::error::{Error, Result};
use crate::repository::WriteMode;
use crate::slicer::SlicingPolicy;
use crate::version::VersionRange;

/// Which kinds of repository a source provides or a run mirrors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorKind {
    #[default]
    Both,
    Metadata,
    Artifacts,
}

impl MirrorKind {
    pub fn includes_metadata(self) -> bool {
        matches!(self, MirrorKind::Both | MirrorKind::Metadata)
    }

    pub fn includes_artifacts(self) -> bool {
        matches!(self, MirrorKind::Both | MirrorKind::Artifacts)
    }
}

impl FromStr for MirrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "both" => Ok(MirrorKind::Both),
            "metadata" => Ok(MirrorKind::Metadata),
            "artifacts" | "artifact" => Ok(MirrorKind::Artifacts),
            other => Err(Error::Config {
                message: format!("Unknown repository kind '{}'", other),
                hint: Some("Use 'both', 'metadata' or 'artifacts'".to_string()),
            }),
        }
    }
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MirrorKind::Both => "both",
            MirrorKind::Metadata => "metadata",
            MirrorKind::Artifacts => "artifacts",
        })
    }
}

/// A source repository location and the catalogs it provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SourceSpec")]
pub struct SourceRepository {
    pub location: String,
    pub kind: MirrorKind,
}

impl SourceRepository {
    pub fn new(location: impl Into<String>, kind: MirrorKind) -> Self {
        SourceRepository {
            location: location.into(),
            kind,
        }
    }
}

/// Either a bare location or a location with a kind.
#[derive(Deserialize)]
#[serde(untagged)]
enum SourceSpec {
    Location(String),
    Detailed {
        location: String,
        #[serde(default)]
        kind: MirrorKind,
    },
}

impl From<SourceSpec> for SourceRepository {
    fn from(spec: SourceSpec) -> Self {
        match spec {
            SourceSpec::Location(location) => SourceRepository::new(location, MirrorKind::Both),
            SourceSpec::Detailed { location, kind } => SourceRepository::new(location, kind),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_comparator() -> String {
    DEFAULT_COMPARATOR.to_string()
}

/// Everything one mirror run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    #[serde(default)]
    pub sources: Vec<SourceRepository>,
    /// Destination location for both metadata and artifacts.
    #[serde(default)]
    pub destination: Option<String>,
    /// Restricts the run to metadata or artifacts.
    #[serde(default)]
    pub kind: MirrorKind,
    /// Repository the source artifacts are compared against.
    #[serde(default)]
    pub baseline: Option<String>,
    /// Root specifications; empty means every unit of the sources.
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default = "default_true")]
    pub raw: bool,
    #[serde(default = "default_true")]
    pub fail_on_error: bool,
    /// Log successful tasks as well as failures.
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub compare: bool,
    #[serde(default)]
    pub validate: bool,
    #[serde(default = "default_true")]
    pub mirror_references: bool,
    #[serde(default)]
    pub mirror_properties: bool,
    #[serde(default = "default_comparator")]
    pub comparator: String,
    /// Glob patterns over `classifier,id,version` never compared.
    #[serde(default)]
    pub compare_exclusions: Vec<String>,
    #[serde(default)]
    pub log: Option<PathBuf>,
    #[serde(default)]
    pub comparator_log: Option<PathBuf>,
    #[serde(default)]
    pub write_mode: WriteMode,
    /// Concurrent artifact transfers.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub slicing: SlicingPolicy,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            sources: Vec::new(),
            destination: None,
            kind: MirrorKind::Both,
            baseline: None,
            roots: Vec::new(),
            raw: true,
            fail_on_error: true,
            verbose: false,
            compare: false,
            validate: false,
            mirror_references: true,
            mirror_properties: false,
            comparator: default_comparator(),
            compare_exclusions: Vec::new(),
            log: None,
            comparator_log: None,
            write_mode: WriteMode::Append,
            parallelism: default_parallelism(),
            slicing: SlicingPolicy::default(),
        }
    }
}

impl MirrorConfig {
    /// Parses a YAML document.
    pub fn parse(yaml_content: &str) -> Result<Self> {
        if yaml_content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml_content).map_err(Error::Yaml)
    }

    /// Parses the YAML file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Cannot read config file {}: {}", path.display(), e),
            hint: None,
        })?;
        Self::parse(&content)
    }

    pub fn has_metadata_sources(&self) -> bool {
        self.sources.iter().any(|s| s.kind.includes_metadata())
    }

    pub fn has_artifact_sources(&self) -> bool {
        self.sources.iter().any(|s| s.kind.includes_artifacts())
    }

    /// Whether the run writes a metadata destination.
    pub fn mirrors_metadata(&self) -> bool {
        self.destination.is_some() && self.kind.includes_metadata()
    }

    /// Whether the run writes an artifact destination.
    pub fn mirrors_artifacts(&self) -> bool {
        self.destination.is_some() && self.kind.includes_artifacts()
    }

    /// Checks the configuration before any repository is opened.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::Config {
                message: "No source repositories configured".to_string(),
                hint: Some("Pass at least one --source".to_string()),
            });
        }
        if self.mirrors_artifacts() && !self.has_artifact_sources() {
            return Err(Error::config(
                "An artifact destination is configured but no source provides artifacts",
            ));
        }
        if self.mirrors_metadata() && !self.has_metadata_sources() {
            return Err(Error::config(
                "A metadata destination is configured but no source provides metadata",
            ));
        }
        if self.parallelism == 0 {
            return Err(Error::config("Parallelism must be at least 1"));
        }
        Ok(())
    }

    /// Parsed root specifications.
    pub fn root_specs(&self) -> Result<Vec<RootSpec>> {
        self.roots.iter().map(|r| r.parse()).collect()
    }
}

/// Selects the units with `id` whose version lies in `range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSpec {
    pub id: String,
    pub range: VersionRange,
}

impl FromStr for RootSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (id, range) = match s.split_once('/') {
            Some((id, range)) => (id.trim(), VersionRange::parse(range.trim())?),
            None => (s, VersionRange::any()),
        };
        if id.is_empty() {
            return Err(Error::config(format!("Invalid root '{}': missing id", s)));
        }
        Ok(RootSpec {
            id: id.to_string(),
            range,
        })
    }
}

impl fmt::Display for RootSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range == VersionRange::any() {
            f.write_str(&self.id)
        } else {
            write!(f, "{}/{}", self.id, self.range)
        }
    }
}

/// Splits a comma-separated list, keeping ranges like `[1.0,2.0)` intact.
pub fn split_list(input: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;
    for token in input.split(',') {
        let current = match pending.take() {
            Some(mut open) => {
                open.push(',');
                open.push_str(token);
                open
            }
            None => token.to_string(),
        };
        let opens = current.contains('[') || current.contains('(');
        let closes = current.contains(']') || current.contains(')');
        if opens && !closes {
            pending = Some(current);
        } else if !current.trim().is_empty() {
            items.push(current.trim().to_string());
        }
    }
    if let Some(rest) = pending {
        if !rest.trim().is_empty() {
            items.push(rest.trim().to_string());
        }
    }
    items
}

/// Parses `key=value`.
pub fn parse_key_value(input: &str) -> Result<(String, String)> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(Error::Config {
            message: format!("Invalid property '{}'", input),
            hint: Some("Use key=value, e.g. os=linux".to_string()),
        }),
    }
}
