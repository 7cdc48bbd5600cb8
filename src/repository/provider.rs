//! Opening repositories from locators.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    ArtifactRepository, DirectoryArtifactRepository, DirectoryMetadataRepository,
    MetadataRepository,
};
use crate::error::{Error, Result};

/// How a destination repository treats content it already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Keep existing content and add to it.
    #[default]
    Append,
    /// Empty the destination before the run.
    Clean,
}

impl WriteMode {
    pub fn is_clean(self) -> bool {
        self == WriteMode::Clean
    }
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "clean" => Ok(WriteMode::Clean),
            other => Err(Error::Config {
                message: format!("Unknown write mode '{}'", other),
                hint: Some("Use 'append' or 'clean'".to_string()),
            }),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => f.write_str("append"),
            WriteMode::Clean => f.write_str("clean"),
        }
    }
}

/// Opens source and destination repositories.
///
/// Sources must already exist. Destinations are created when missing.
pub trait RepositoryProvider: Send + Sync {
    fn open_metadata_source(&self, locator: &str) -> Result<Arc<dyn MetadataRepository>>;

    fn open_artifact_source(&self, locator: &str) -> Result<Arc<dyn ArtifactRepository>>;

    fn open_metadata_destination(
        &self,
        locator: &str,
        mode: WriteMode,
    ) -> Result<Arc<dyn MetadataRepository>>;

    fn open_artifact_destination(
        &self,
        locator: &str,
        mode: WriteMode,
    ) -> Result<Arc<dyn ArtifactRepository>>;
}

/// Resolves a plain path or `file://` URL to a filesystem path.
pub fn locator_to_path(locator: &str) -> Result<PathBuf> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(Error::config("Empty repository location"));
    }
    if trimmed.starts_with("file:") {
        let url = Url::parse(trimmed)?;
        return url.to_file_path().map_err(|_| Error::Config {
            message: format!("'{}' does not denote a local path", locator),
            hint: None,
        });
    }
    if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(Error::Config {
            message: format!("Unsupported repository scheme '{}' in '{}'", scheme, locator),
            hint: Some("Use a local path or a file:// URL".to_string()),
        });
    }
    Ok(PathBuf::from(trimmed))
}

/// Opens [`directory`](super::directory) repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryRepositoryProvider;

impl RepositoryProvider for DirectoryRepositoryProvider {
    fn open_metadata_source(&self, locator: &str) -> Result<Arc<dyn MetadataRepository>> {
        let path = locator_to_path(locator)?;
        Ok(Arc::new(DirectoryMetadataRepository::open(&path)?))
    }

    fn open_artifact_source(&self, locator: &str) -> Result<Arc<dyn ArtifactRepository>> {
        let path = locator_to_path(locator)?;
        Ok(Arc::new(DirectoryArtifactRepository::open(&path)?))
    }

    fn open_metadata_destination(
        &self,
        locator: &str,
        mode: WriteMode,
    ) -> Result<Arc<dyn MetadataRepository>> {
        let path = locator_to_path(locator)?;
        Ok(Arc::new(DirectoryMetadataRepository::create(
            &path,
            mode.is_clean(),
        )?))
    }

    fn open_artifact_destination(
        &self,
        locator: &str,
        mode: WriteMode,
    ) -> Result<Arc<dyn ArtifactRepository>> {
        let path = locator_to_path(locator)?;
        Ok(Arc::new(DirectoryArtifactRepository::create(
            &path,
            mode.is_clean(),
        )?))
    }
}
