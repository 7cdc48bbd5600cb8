//! Read-only unions of several source repositories.
//!
//! Children are consulted in order; when two children hold the same unit or
//! artifact, the first one wins. Writing to a composite is a repository error.

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use super::{ArtifactRepository, ArtifactSink, MetadataRepository, UnitQuery};
use crate::error::{Error, Result};
use crate::model::{ArtifactDescriptor, ArtifactKey, Requirement, RepositoryReference, Unit};

fn composite_location<'a>(locations: impl Iterator<Item = &'a str>) -> String {
    format!("composite[{}]", locations.collect::<Vec<_>>().join(", "))
}

fn dedup_units(units: Vec<Arc<Unit>>) -> Vec<Arc<Unit>> {
    let mut seen = HashSet::new();
    units.into_iter().filter(|u| seen.insert(u.key())).collect()
}

pub struct CompositeMetadataRepository {
    location: String,
    children: Vec<Arc<dyn MetadataRepository>>,
}

impl CompositeMetadataRepository {
    pub fn new(children: Vec<Arc<dyn MetadataRepository>>) -> Self {
        let location = composite_location(children.iter().map(|c| c.location()));
        CompositeMetadataRepository { location, children }
    }

    pub fn children(&self) -> &[Arc<dyn MetadataRepository>] {
        &self.children
    }

    fn collect<F>(&self, mut from_child: F) -> Result<Vec<Arc<Unit>>>
    where
        F: FnMut(&dyn MetadataRepository) -> Result<Vec<Arc<Unit>>>,
    {
        let mut all = Vec::new();
        for child in &self.children {
            all.extend(from_child(child.as_ref())?);
        }
        Ok(dedup_units(all))
    }
}

impl MetadataRepository for CompositeMetadataRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn units(&self) -> Result<Vec<Arc<Unit>>> {
        self.collect(|child| child.units())
    }

    fn query(&self, query: &UnitQuery) -> Result<Vec<Arc<Unit>>> {
        self.collect(|child| child.query(query))
    }

    fn providers(&self, requirement: &Requirement) -> Result<Vec<Arc<Unit>>> {
        self.collect(|child| child.providers(requirement))
    }

    fn references(&self) -> Result<Vec<RepositoryReference>> {
        let mut references: Vec<RepositoryReference> = Vec::new();
        for child in &self.children {
            for reference in child.references()? {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }
        Ok(references)
    }

    fn add_units(&self, _units: &[Arc<Unit>]) -> Result<()> {
        Err(Error::repository(&self.location, "composite repositories are read-only"))
    }

    fn add_references(&self, _references: &[RepositoryReference]) -> Result<()> {
        Err(Error::repository(&self.location, "composite repositories are read-only"))
    }
}

pub struct CompositeArtifactRepository {
    location: String,
    children: Vec<Arc<dyn ArtifactRepository>>,
}

impl CompositeArtifactRepository {
    pub fn new(children: Vec<Arc<dyn ArtifactRepository>>) -> Self {
        let location = composite_location(children.iter().map(|c| c.location()));
        CompositeArtifactRepository { location, children }
    }

    /// First child holding `key`.
    fn owner(&self, key: &ArtifactKey) -> Result<Option<&dyn ArtifactRepository>> {
        for child in &self.children {
            if child.contains(key)? {
                return Ok(Some(child.as_ref()));
            }
        }
        Ok(None)
    }
}

impl ArtifactRepository for CompositeArtifactRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        let mut keys = Vec::new();
        for child in &self.children {
            keys.extend(child.keys()?);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>> {
        for child in &self.children {
            if let Some(descriptor) = child.descriptor(key)? {
                return Ok(Some(descriptor));
            }
        }
        Ok(None)
    }

    fn read(&self, key: &ArtifactKey) -> Result<Box<dyn Read + Send>> {
        match self.owner(key)? {
            Some(child) => child.read(key),
            None => Err(Error::Artifact {
                key: key.to_string(),
                message: format!("not found in {}", self.location),
            }),
        }
    }

    fn write(&self, _key: &ArtifactKey) -> Result<Box<dyn ArtifactSink>> {
        Err(Error::repository(&self.location, "composite repositories are read-only"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryArtifactRepository, MemoryMetadataRepository};
    use crate::version::{Version, VersionRange};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_metadata_union_first_wins() {
        let first = MemoryMetadataRepository::with_units(
            "first",
            vec![Unit::new("a", v("1.0")).with_artifact(ArtifactKey::new("plugin", "a", v("1.0")))],
        );
        let second = MemoryMetadataRepository::with_units(
            "second",
            vec![Unit::new("a", v("1.0")), Unit::new("b", v("1.0"))],
        );
        let composite = CompositeMetadataRepository::new(vec![Arc::new(first), Arc::new(second)]);

        assert_eq!(composite.location(), "composite[first, second]");
        let units = composite.units().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].artifacts.len(), 1);

        let req = Requirement::unit("b", VersionRange::any());
        assert_eq!(composite.providers(&req).unwrap().len(), 1);
        assert!(composite.add_units(&[]).is_err());
    }

    #[test]
    fn test_artifact_union_reads_from_owner() {
        let key_a = ArtifactKey::new("plugin", "a", v("1.0"));
        let key_b = ArtifactKey::new("plugin", "b", v("1.0"));
        let first = MemoryArtifactRepository::new("first");
        first
            .insert(ArtifactDescriptor::new(key_a.clone()), b"A1".to_vec())
            .unwrap();
        let second = MemoryArtifactRepository::new("second");
        second
            .insert(ArtifactDescriptor::new(key_a.clone()), b"A2".to_vec())
            .unwrap();
        second
            .insert(ArtifactDescriptor::new(key_b.clone()), b"B".to_vec())
            .unwrap();

        let composite = CompositeArtifactRepository::new(vec![Arc::new(first), Arc::new(second)]);
        assert_eq!(composite.keys().unwrap(), vec![key_a.clone(), key_b.clone()]);

        let mut content = Vec::new();
        composite
            .read(&key_a)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"A1");
        assert!(composite.write(&key_b).is_err());
    }
}
