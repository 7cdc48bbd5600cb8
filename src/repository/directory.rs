//! # Directory Repositories
//!
//! An on-disk repository layout:
//!
//! ```text
//! <root>/content.yaml                  name, references, units
//! <root>/artifacts.yaml                artifact descriptors
//! <root>/<classifier>/<id>_<version>   artifact bytes
//! ```
//!
//! Every write goes to a temporary file in the target directory and is
//! published with an atomic rename, so readers never observe a partially
//! written artifact or index. Committed artifacts are visible through the
//! repository at once; `artifacts.yaml` is rewritten on
//! [`flush`](ArtifactRepository::flush) and when the repository is dropped.
//!
//! Classifiers and ids become path components, so a key whose classifier or
//! id is empty, `.`, `..`, absolute, or contains a path separator is rejected
//! with [`Error::Artifact`].

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{unpoison, ArtifactRepository, ArtifactSink, MetadataRepository};
use crate::defaults::{ARTIFACT_INDEX_FILE, METADATA_INDEX_FILE};
use crate::error::{Error, Result};
use crate::model::{ArtifactDescriptor, ArtifactKey, RepositoryReference, Unit};

/// Serialises `value` as YAML into `path` through a temporary file.
fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_yaml::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        Error::repository(
            path.display().to_string(),
            format!("invalid index: {}", e),
        )
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContentIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    references: Vec<RepositoryReference>,
    #[serde(default)]
    units: Vec<Unit>,
}

struct MetadataState {
    name: Option<String>,
    references: Vec<RepositoryReference>,
    units: Vec<Arc<Unit>>,
}

impl MetadataState {
    fn to_index(&self) -> ContentIndex {
        ContentIndex {
            name: self.name.clone(),
            references: self.references.clone(),
            units: self.units.iter().map(|u| u.as_ref().clone()).collect(),
        }
    }
}

/// Units and references stored in `<root>/content.yaml`.
pub struct DirectoryMetadataRepository {
    index_path: PathBuf,
    location: String,
    state: RwLock<MetadataState>,
}

impl DirectoryMetadataRepository {
    /// Opens an existing repository. A missing index is an error.
    pub fn open(root: &Path) -> Result<Self> {
        let index_path = root.join(METADATA_INDEX_FILE);
        if !index_path.is_file() {
            return Err(Error::repository(
                root.display().to_string(),
                format!("no {} found", METADATA_INDEX_FILE),
            ));
        }
        let index: ContentIndex = read_yaml(&index_path)?;
        let mut seen = HashSet::new();
        let units = index
            .units
            .into_iter()
            .filter(|u| seen.insert(u.key()))
            .map(Arc::new)
            .collect();
        debug!("Opened metadata repository {}", root.display());
        Ok(DirectoryMetadataRepository {
            index_path,
            location: root.display().to_string(),
            state: RwLock::new(MetadataState {
                name: index.name,
                references: index.references,
                units,
            }),
        })
    }

    /// Opens the repository at `root`, creating an empty one when absent.
    ///
    /// With `clean`, any existing content is discarded.
    pub fn create(root: &Path, clean: bool) -> Result<Self> {
        let index_path = root.join(METADATA_INDEX_FILE);
        if clean || !index_path.is_file() {
            write_yaml_atomic(&index_path, &ContentIndex::default())?;
        }
        Self::open(root)
    }

    fn persist(&self, state: &MetadataState) -> Result<()> {
        write_yaml_atomic(&self.index_path, &state.to_index())
    }
}

impl MetadataRepository for DirectoryMetadataRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn units(&self) -> Result<Vec<Arc<Unit>>> {
        Ok(unpoison(self.state.read(), "directory metadata")?
            .units
            .clone())
    }

    fn references(&self) -> Result<Vec<RepositoryReference>> {
        Ok(unpoison(self.state.read(), "directory metadata")?
            .references
            .clone())
    }

    fn add_units(&self, units: &[Arc<Unit>]) -> Result<()> {
        let mut state = unpoison(self.state.write(), "directory metadata")?;
        let before = state.units.len();
        let mut present: HashSet<_> = state.units.iter().map(|u| u.key()).collect();
        for unit in units {
            if present.insert(unit.key()) {
                state.units.push(Arc::clone(unit));
            }
        }
        if let Err(e) = self.persist(&state) {
            state.units.truncate(before);
            return Err(e);
        }
        debug!(
            "Added {} units to {}",
            state.units.len() - before,
            self.location
        );
        Ok(())
    }

    fn add_references(&self, references: &[RepositoryReference]) -> Result<()> {
        let mut state = unpoison(self.state.write(), "directory metadata")?;
        let before = state.references.len();
        for reference in references {
            if !state.references.contains(reference) {
                state.references.push(reference.clone());
            }
        }
        if let Err(e) = self.persist(&state) {
            state.references.truncate(before);
            return Err(e);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtifactIndex {
    #[serde(default)]
    descriptors: Vec<ArtifactDescriptor>,
}

type DescriptorMap = BTreeMap<ArtifactKey, ArtifactDescriptor>;

fn check_segment(key: &ArtifactKey, part: &str, value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || Path::new(value).is_absolute();
    if invalid {
        return Err(Error::Artifact {
            key: key.to_string(),
            message: format!("{} {:?} is not a valid path component", part, value),
        });
    }
    Ok(())
}

/// Where the bytes of `key` live below `root`.
fn blob_path(root: &Path, key: &ArtifactKey) -> Result<PathBuf> {
    check_segment(key, "classifier", &key.classifier)?;
    check_segment(key, "id", &key.id)?;
    Ok(root
        .join(&key.classifier)
        .join(format!("{}_{}", key.id, key.version)))
}

fn write_artifact_index(path: &Path, descriptors: &DescriptorMap) -> Result<()> {
    let index = ArtifactIndex {
        descriptors: descriptors.values().cloned().collect(),
    };
    write_yaml_atomic(path, &index)
}

/// Artifacts stored below a root directory, indexed by `<root>/artifacts.yaml`.
pub struct DirectoryArtifactRepository {
    root: PathBuf,
    index_path: PathBuf,
    location: String,
    descriptors: Arc<RwLock<DescriptorMap>>,
    /// Set by commits not yet written to the index file.
    dirty: Arc<AtomicBool>,
}

impl DirectoryArtifactRepository {
    /// Opens an existing repository. A missing index is an error.
    pub fn open(root: &Path) -> Result<Self> {
        let index_path = root.join(ARTIFACT_INDEX_FILE);
        if !index_path.is_file() {
            return Err(Error::repository(
                root.display().to_string(),
                format!("no {} found", ARTIFACT_INDEX_FILE),
            ));
        }
        let index: ArtifactIndex = read_yaml(&index_path)?;
        let descriptors = index
            .descriptors
            .into_iter()
            .map(|d| (d.key.clone(), d))
            .collect();
        debug!("Opened artifact repository {}", root.display());
        Ok(DirectoryArtifactRepository {
            root: root.to_path_buf(),
            index_path,
            location: root.display().to_string(),
            descriptors: Arc::new(RwLock::new(descriptors)),
            dirty: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Opens the repository at `root`, creating an empty one when absent.
    ///
    /// With `clean`, the stored artifacts are deleted first.
    pub fn create(root: &Path, clean: bool) -> Result<Self> {
        let index_path = root.join(ARTIFACT_INDEX_FILE);
        if index_path.is_file() && clean {
            let existing = Self::open(root)?;
            for key in existing.keys()? {
                let path = blob_path(root, &key)?;
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if clean || !index_path.is_file() {
            write_artifact_index(&index_path, &DescriptorMap::new())?;
        }
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactRepository for DirectoryArtifactRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        Ok(unpoison(self.descriptors.read(), "directory artifact index")?
            .keys()
            .cloned()
            .collect())
    }

    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>> {
        Ok(unpoison(self.descriptors.read(), "directory artifact index")?
            .get(key)
            .cloned())
    }

    fn read(&self, key: &ArtifactKey) -> Result<Box<dyn Read + Send>> {
        if !self.contains(key)? {
            return Err(Error::Artifact {
                key: key.to_string(),
                message: format!("not found in {}", self.location),
            });
        }
        let file = File::open(blob_path(&self.root, key)?).map_err(|e| Error::Artifact {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn write(&self, key: &ArtifactKey) -> Result<Box<dyn ArtifactSink>> {
        let target = blob_path(&self.root, key)?;
        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let temp = NamedTempFile::new_in(dir)?;
        Ok(Box::new(DirectorySink {
            writer: BufWriter::new(temp),
            target,
            descriptors: Arc::clone(&self.descriptors),
            dirty: Arc::clone(&self.dirty),
        }))
    }

    fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let descriptors = unpoison(self.descriptors.read(), "directory artifact index")?;
        if let Err(e) = write_artifact_index(&self.index_path, &descriptors) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        debug!("Wrote {} descriptors to {}", descriptors.len(), self.index_path.display());
        Ok(())
    }
}

impl Drop for DirectoryArtifactRepository {
    fn drop(&mut self) {
        if let Err(e) = ArtifactRepository::flush(self) {
            warn!("Failed to write artifact index of {}: {}", self.location, e);
        }
    }
}

/// Writes into a temporary file next to the final blob path.
///
/// Dropping the sink without committing deletes the temporary file.
struct DirectorySink {
    writer: BufWriter<NamedTempFile>,
    target: PathBuf,
    descriptors: Arc<RwLock<DescriptorMap>>,
    dirty: Arc<AtomicBool>,
}

impl Write for DirectorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ArtifactSink for DirectorySink {
    fn commit(self: Box<Self>, descriptor: ArtifactDescriptor) -> Result<()> {
        let DirectorySink {
            writer,
            target,
            descriptors,
            dirty,
        } = *self;
        let temp = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| Error::Io(e.error))?;

        let key = descriptor.key.clone();
        unpoison(descriptors.write(), "directory artifact index")?.insert(key, descriptor);
        dirty.store(true, Ordering::SeqCst);
        debug!("Committed {}", target.display());
        Ok(())
    }
}
