//! # Repositories
//!
//! Narrow interfaces to the catalogs the mirror reads from and writes to.
//!
//! ## Design
//!
//! Two traits separate the two kinds of catalog:
//!
//! - **[`MetadataRepository`]**: units and repository references. Offers
//!   queries by id and version range, capability lookup for the slicer, and
//!   atomic batch insertion.
//! - **[`ArtifactRepository`]**: artifact descriptors and their bytes. Reads
//!   are streams; writes go through an [`ArtifactSink`] that only becomes
//!   visible to readers once committed. A sink dropped without `commit` is
//!   discarded.
//!
//! Both traits take `&self` for mutation so a repository can be shared as an
//! `Arc` between mirror workers. Concrete implementations:
//!
//! - [`memory`]: in-memory repositories, used by tests and embedders.
//! - [`directory`]: an on-disk layout with YAML indexes and atomic renames.
//! - [`composite`]: read-only unions of several sources.
//!
//! [`provider`] opens repositories from locators (paths or `file://` URLs).

pub mod composite;
pub mod directory;
pub mod memory;
pub mod provider;

use std::io::{Read, Write};
use std::sync::{Arc, LockResult};

use crate::error::{Error, Result};
use crate::model::{ArtifactDescriptor, ArtifactKey, Requirement, RepositoryReference, Unit};
use crate::slicer::Lookup;
use crate::version::VersionRange;

pub use composite::{CompositeArtifactRepository, CompositeMetadataRepository};
pub use directory::{DirectoryArtifactRepository, DirectoryMetadataRepository};
pub use memory::{MemoryArtifactRepository, MemoryMetadataRepository};
pub use provider::{DirectoryRepositoryProvider, RepositoryProvider, WriteMode};

/// Selects units of a metadata repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitQuery {
    All,
    /// Units with this id whose version lies in `range`.
    Id { id: String, range: VersionRange },
}

impl UnitQuery {
    pub fn id(id: impl Into<String>, range: VersionRange) -> Self {
        UnitQuery::Id {
            id: id.into(),
            range,
        }
    }

    pub fn matches(&self, unit: &Unit) -> bool {
        match self {
            UnitQuery::All => true,
            UnitQuery::Id { id, range } => unit.id == *id && range.contains(&unit.version),
        }
    }
}

/// A catalog of units and references to other repositories.
pub trait MetadataRepository: Send + Sync {
    /// Where the repository lives, for messages.
    fn location(&self) -> &str;

    /// Every unit, in repository order.
    fn units(&self) -> Result<Vec<Arc<Unit>>>;

    fn query(&self, query: &UnitQuery) -> Result<Vec<Arc<Unit>>> {
        Ok(self
            .units()?
            .into_iter()
            .filter(|u| query.matches(u))
            .collect())
    }

    /// Units providing a capability that satisfies `requirement`.
    fn providers(&self, requirement: &Requirement) -> Result<Vec<Arc<Unit>>> {
        Ok(self
            .units()?
            .into_iter()
            .filter(|u| requirement.is_satisfied_by(u))
            .collect())
    }

    fn references(&self) -> Result<Vec<RepositoryReference>>;

    /// Adds a batch of units. Either the whole batch is stored or none of it.
    ///
    /// Units whose id+version is already present are left unchanged.
    fn add_units(&self, units: &[Arc<Unit>]) -> Result<()>;

    /// Adds references that are not yet present.
    fn add_references(&self, references: &[RepositoryReference]) -> Result<()>;
}

/// Write side of an artifact transfer.
///
/// Bytes written are invisible to readers of the repository until
/// [`commit`](ArtifactSink::commit) succeeds.
pub trait ArtifactSink: Write + Send {
    /// Publishes the written bytes under `descriptor`.
    fn commit(self: Box<Self>, descriptor: ArtifactDescriptor) -> Result<()>;
}

/// A catalog of artifact descriptors and their content.
pub trait ArtifactRepository: Send + Sync {
    fn location(&self) -> &str;

    /// Keys of every stored artifact, sorted.
    fn keys(&self) -> Result<Vec<ArtifactKey>>;

    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>>;

    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.descriptor(key)?.is_some())
    }

    /// Opens the content of `key` for streaming.
    fn read(&self, key: &ArtifactKey) -> Result<Box<dyn Read + Send>>;

    /// Starts writing the content of `key`.
    fn write(&self, key: &ArtifactKey) -> Result<Box<dyn ArtifactSink>>;

    /// Persists the index of committed artifacts, for repositories that
    /// defer it.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Adapts a metadata repository to the slicer's [`Lookup`].
///
/// Any repository failure is reported as [`Error::Lookup`].
pub struct RepositoryLookup<'a> {
    repository: &'a dyn MetadataRepository,
}

impl<'a> RepositoryLookup<'a> {
    pub fn new(repository: &'a dyn MetadataRepository) -> Self {
        RepositoryLookup { repository }
    }
}

impl Lookup for RepositoryLookup<'_> {
    fn lookup(&self, requirement: &Requirement) -> Result<Vec<Arc<Unit>>> {
        self.repository
            .providers(requirement)
            .map_err(|e| match e {
                Error::Lookup { .. } => e,
                other => Error::Lookup {
                    requirement: requirement.to_string(),
                    message: other.to_string(),
                },
            })
    }
}

/// Maps a poisoned lock to [`Error::LockPoisoned`].
pub(crate) fn unpoison<T>(result: LockResult<T>, context: &str) -> Result<T> {
    result.map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

/// A reader that fails with `message` on first use.
///
/// Lets repositories report an unreadable artifact as a stream error rather
/// than an open error.
pub struct FailingReader {
    message: String,
}

impl FailingReader {
    pub fn new(message: impl Into<String>) -> Self {
        FailingReader {
            message: message.into(),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            self.message.clone(),
        ))
    }
}
