//! Metadata mirroring: the closure's units plus repository references.

use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::model::Unit;
use crate::repository::MetadataRepository;

/// What a metadata mirror run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataSummary {
    pub units: usize,
    pub references: usize,
}

/// Adds `units` to `destination` as one batch, then, with
/// `mirror_references`, the references of `source`.
///
/// There is no per-unit verification; any failure is returned as `Err`.
pub fn mirror_metadata(
    units: &[Arc<Unit>],
    source: &dyn MetadataRepository,
    destination: &dyn MetadataRepository,
    mirror_references: bool,
) -> Result<MetadataSummary> {
    destination.add_units(units)?;

    let references = if mirror_references {
        let references = source.references()?;
        destination.add_references(&references)?;
        references.len()
    } else {
        0
    };

    info!(
        "Mirrored {} units and {} references to {}",
        units.len(),
        references,
        destination.location()
    );
    Ok(MetadataSummary {
        units: units.len(),
        references,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RepositoryKind, RepositoryReference};
    use crate::repository::MemoryMetadataRepository;
    use crate::version::Version;

    fn source() -> MemoryMetadataRepository {
        let source = MemoryMetadataRepository::with_units(
            "source",
            vec![
                Unit::new("a", Version::parse("1.0").unwrap()),
                Unit::new("b", Version::parse("1.0").unwrap()),
            ],
        );
        source
            .add_references(&[RepositoryReference {
                location: "file:///updates".to_string(),
                kind: RepositoryKind::Metadata,
                enabled: true,
            }])
            .unwrap();
        source
    }

    #[test]
    fn test_copies_units_and_references() {
        let source = source();
        let destination = MemoryMetadataRepository::new("dest");
        let units = source.units().unwrap();
        let summary = mirror_metadata(&units[..1], &source, &destination, true).unwrap();

        assert_eq!(summary, MetadataSummary { units: 1, references: 1 });
        assert_eq!(destination.units().unwrap().len(), 1);
        assert_eq!(destination.references().unwrap().len(), 1);
    }

    #[test]
    fn test_references_optional() {
        let source = source();
        let destination = MemoryMetadataRepository::new("dest");
        let units = source.units().unwrap();
        let summary = mirror_metadata(&units, &source, &destination, false).unwrap();
        assert_eq!(summary.references, 0);
        assert!(destination.references().unwrap().is_empty());
    }
}
