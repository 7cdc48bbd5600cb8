//! In-memory repositories.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read, Write};
use std::sync::{Arc, RwLock};

use super::{unpoison, ArtifactRepository, ArtifactSink, FailingReader, MetadataRepository};
use crate::error::{Error, Result};
use crate::model::{ArtifactDescriptor, ArtifactKey, RepositoryReference, Unit};

/// Units and references held in memory.
pub struct MemoryMetadataRepository {
    location: String,
    units: RwLock<Vec<Arc<Unit>>>,
    references: RwLock<Vec<RepositoryReference>>,
}

impl MemoryMetadataRepository {
    pub fn new(location: impl Into<String>) -> Self {
        MemoryMetadataRepository {
            location: location.into(),
            units: RwLock::new(Vec::new()),
            references: RwLock::new(Vec::new()),
        }
    }

    /// Builds a repository holding `units`.
    pub fn with_units<I: IntoIterator<Item = Unit>>(location: impl Into<String>, units: I) -> Self {
        let mut repo = Self::new(location);
        let mut seen = HashSet::new();
        let units = units
            .into_iter()
            .filter(|u| seen.insert(u.key()))
            .map(Arc::new)
            .collect();
        repo.units = RwLock::new(units);
        repo
    }
}

impl MetadataRepository for MemoryMetadataRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn units(&self) -> Result<Vec<Arc<Unit>>> {
        Ok(unpoison(self.units.read(), "memory metadata units")?.clone())
    }

    fn references(&self) -> Result<Vec<RepositoryReference>> {
        Ok(unpoison(self.references.read(), "memory metadata references")?.clone())
    }

    fn add_units(&self, units: &[Arc<Unit>]) -> Result<()> {
        let mut stored = unpoison(self.units.write(), "memory metadata units")?;
        let mut present: HashSet<_> = stored.iter().map(|u| u.key()).collect();
        for unit in units {
            if present.insert(unit.key()) {
                stored.push(Arc::clone(unit));
            }
        }
        Ok(())
    }

    fn add_references(&self, references: &[RepositoryReference]) -> Result<()> {
        let mut stored = unpoison(self.references.write(), "memory metadata references")?;
        for reference in references {
            if !stored.contains(reference) {
                stored.push(reference.clone());
            }
        }
        Ok(())
    }
}

type ArtifactStore = BTreeMap<ArtifactKey, (ArtifactDescriptor, Arc<Vec<u8>>)>;

/// Artifacts held in memory.
///
/// Reads of keys registered through [`fail_reads_of`](Self::fail_reads_of)
/// return a stream that errors, and writes can be made to fail on commit;
/// both exist to exercise error paths.
pub struct MemoryArtifactRepository {
    location: String,
    store: Arc<RwLock<ArtifactStore>>,
    failing_reads: RwLock<HashSet<ArtifactKey>>,
    failing_commits: Arc<RwLock<HashSet<ArtifactKey>>>,
}

impl MemoryArtifactRepository {
    pub fn new(location: impl Into<String>) -> Self {
        MemoryArtifactRepository {
            location: location.into(),
            store: Arc::new(RwLock::new(BTreeMap::new())),
            failing_reads: RwLock::new(HashSet::new()),
            failing_commits: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Stores `bytes` under `descriptor`, replacing any previous entry.
    pub fn insert(&self, descriptor: ArtifactDescriptor, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let mut store = unpoison(self.store.write(), "memory artifact store")?;
        store.insert(descriptor.key.clone(), (descriptor, Arc::new(bytes.into())));
        Ok(())
    }

    /// Content stored under `key`.
    pub fn bytes(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        let store = unpoison(self.store.read(), "memory artifact store")?;
        Ok(store.get(key).map(|(_, bytes)| bytes.as_ref().clone()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(unpoison(self.store.read(), "memory artifact store")?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn fail_reads_of(&self, key: ArtifactKey) -> Result<()> {
        unpoison(self.failing_reads.write(), "memory artifact failures")?.insert(key);
        Ok(())
    }

    pub fn fail_commits_of(&self, key: ArtifactKey) -> Result<()> {
        unpoison(self.failing_commits.write(), "memory artifact failures")?.insert(key);
        Ok(())
    }
}

impl ArtifactRepository for MemoryArtifactRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        Ok(unpoison(self.store.read(), "memory artifact store")?
            .keys()
            .cloned()
            .collect())
    }

    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>> {
        let store = unpoison(self.store.read(), "memory artifact store")?;
        Ok(store.get(key).map(|(descriptor, _)| descriptor.clone()))
    }

    fn read(&self, key: &ArtifactKey) -> Result<Box<dyn Read + Send>> {
        if unpoison(self.failing_reads.read(), "memory artifact failures")?.contains(key) {
            return Ok(Box::new(FailingReader::new(format!(
                "simulated read failure for {}",
                key
            ))));
        }
        let store = unpoison(self.store.read(), "memory artifact store")?;
        match store.get(key) {
            Some((_, bytes)) => Ok(Box::new(io::Cursor::new(SharedBytes(Arc::clone(bytes))))),
            None => Err(Error::Artifact {
                key: key.to_string(),
                message: format!("not found in {}", self.location),
            }),
        }
    }

    fn write(&self, key: &ArtifactKey) -> Result<Box<dyn ArtifactSink>> {
        Ok(Box::new(MemorySink {
            key: key.clone(),
            buffer: Vec::new(),
            store: Arc::clone(&self.store),
            failing_commits: Arc::clone(&self.failing_commits),
        }))
    }
}

/// Shared, immutable artifact content.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct MemorySink {
    key: ArtifactKey,
    buffer: Vec<u8>,
    store: Arc<RwLock<ArtifactStore>>,
    failing_commits: Arc<RwLock<HashSet<ArtifactKey>>>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactSink for MemorySink {
    fn commit(self: Box<Self>, descriptor: ArtifactDescriptor) -> Result<()> {
        if unpoison(self.failing_commits.read(), "memory artifact failures")?.contains(&self.key) {
            return Err(Error::Artifact {
                key: self.key.to_string(),
                message: "simulated commit failure".to_string(),
            });
        }
        let MemorySink {
            key, buffer, store, ..
        } = *self;
        let mut store = unpoison(store.write(), "memory artifact store")?;
        store.insert(key, (descriptor, Arc::new(buffer)));
        Ok(())
    }
}
