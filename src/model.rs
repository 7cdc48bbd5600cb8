//! # Unit Graph Model
//!
//! Read-only descriptions of what a repository holds:
//!
//! - **[`Unit`]**: a versioned component with requirements, provided
//!   capabilities and references to binary artifacts. A unit's identity is its
//!   [`UnitKey`] (id + version).
//! - **[`Requirement`]**: a query against the capability space (namespace,
//!   name, version range) with `optional`, `greedy` and `multiple` flags and an
//!   optional filter.
//! - **[`Capability`]**: something a unit provides. Every unit implicitly
//!   provides `unit:<id>@<version>`.
//! - **[`ArtifactKey`]** / **[`ArtifactDescriptor`]**: the identity and the
//!   catalog entry of a binary blob.
//!
//! Units are shared as `Arc<Unit>` between the repository that loaded them, the
//! slicer and the mirror; nothing in the crate mutates them after loading.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::version::{Version, VersionRange};

/// Namespace of the capability every unit provides for itself.
pub const UNIT_NAMESPACE: &str = "unit";

/// Descriptor property holding the artifact size in bytes.
pub const PROP_SIZE: &str = "download.size";

/// Prefix of descriptor properties holding checksums, e.g. `download.checksum.sha-256`.
pub const PROP_CHECKSUM_PREFIX: &str = "download.checksum.";

/// Descriptor property naming the storage format of the artifact.
pub const PROP_FORMAT: &str = "format";

/// Identity of a unit within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub id: String,
    pub version: Version,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Something a unit provides and requirements match against.
///
/// A capability stored without a `name` is read as a generic capability, see
/// [`Capability::generic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CapabilitySpec")]
pub struct Capability {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub directives: BTreeMap<String, String>,
}

impl Capability {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Capability {
            namespace: namespace.into(),
            name: name.into(),
            version,
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
        }
    }

    /// Builds a capability declared only through attributes.
    ///
    /// The name is the string attribute keyed by the namespace itself and the
    /// version is the `version` attribute; either falls back to empty/`0.0.0`.
    pub fn generic(
        namespace: impl Into<String>,
        attributes: BTreeMap<String, serde_yaml::Value>,
        directives: BTreeMap<String, String>,
    ) -> Self {
        let namespace = namespace.into();
        let name = attributes
            .get(&namespace)
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version = attributes
            .get("version")
            .and_then(serde_yaml::Value::as_str)
            .and_then(|v| Version::parse(v).ok())
            .unwrap_or_default();
        Capability {
            namespace,
            name,
            version,
            attributes,
            directives,
        }
    }
}

/// Stored form of a capability: `name` and `version` may be omitted.
#[derive(Deserialize)]
struct CapabilitySpec {
    namespace: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<Version>,
    #[serde(default)]
    attributes: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    directives: BTreeMap<String, String>,
}

impl From<CapabilitySpec> for Capability {
    fn from(spec: CapabilitySpec) -> Self {
        match spec.name {
            Some(name) => Capability {
                namespace: spec.namespace,
                name,
                version: spec.version.unwrap_or_default(),
                attributes: spec.attributes,
                directives: spec.directives,
            },
            None => {
                let mut capability =
                    Capability::generic(spec.namespace, spec.attributes, spec.directives);
                if let Some(version) = spec.version {
                    capability.version = version;
                }
                capability
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.namespace, self.name, self.version)
    }
}

fn default_namespace() -> String {
    UNIT_NAMESPACE.to_string()
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// A query a unit poses against the capabilities of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub range: VersionRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Unsatisfied optional requirements never escalate beyond a warning.
    #[serde(default)]
    pub optional: bool,
    /// Non-greedy requirements are only followed when the policy makes
    /// everything greedy.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub greedy: bool,
    /// Whether several providers may satisfy the requirement at once.
    #[serde(default)]
    pub multiple: bool,
}

impl Requirement {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, range: VersionRange) -> Self {
        Requirement {
            namespace: namespace.into(),
            name: name.into(),
            range,
            filter: None,
            optional: false,
            greedy: true,
            multiple: false,
        }
    }

    /// A requirement on another unit by id.
    pub fn unit(name: impl Into<String>, range: VersionRange) -> Self {
        Requirement::new(UNIT_NAMESPACE, name, range)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn non_greedy(mut self) -> Self {
        self.greedy = false;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(&self, capability: &Capability) -> bool {
        capability.namespace == self.namespace
            && capability.name == self.name
            && self.range.contains(&capability.version)
    }

    /// True when any capability of `unit` matches.
    pub fn is_satisfied_by(&self, unit: &Unit) -> bool {
        self.matches(&unit.self_capability()) || unit.capabilities.iter().any(|c| self.matches(c))
    }

    /// Strict requirements pin exactly one version.
    pub fn is_strict(&self) -> bool {
        self.range.is_exact()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.namespace, self.name, self.range)?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

/// The installer technology a unit is configured by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchpointType {
    pub id: String,
    #[serde(default)]
    pub version: Version,
}

/// A versioned, named component description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    /// Requirements of the installer rather than of the unit itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_requirements: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touchpoint: Option<TouchpointType>,
    #[serde(default)]
    pub fragment: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Unit {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Unit {
            id: id.into(),
            version,
            requirements: Vec::new(),
            meta_requirements: Vec::new(),
            capabilities: Vec::new(),
            artifacts: Vec::new(),
            filter: None,
            touchpoint: None,
            fragment: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn provides(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_artifact(mut self, key: ArtifactKey) -> Self {
        self.artifacts.push(key);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn key(&self) -> UnitKey {
        UnitKey {
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }

    /// The capability every unit provides for itself.
    pub fn self_capability(&self) -> Capability {
        Capability::new(UNIT_NAMESPACE, self.id.clone(), self.version.clone())
    }

    /// Requirements and meta requirements, in declaration order.
    pub fn all_requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter().chain(self.meta_requirements.iter())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Identity of a binary blob: classifier + id + version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub classifier: String,
    pub id: String,
    pub version: Version,
}

impl ArtifactKey {
    pub fn new(classifier: impl Into<String>, id: impl Into<String>, version: Version) -> Self {
        ArtifactKey {
            classifier: classifier.into(),
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.classifier, self.id, self.version)
    }
}

impl FromStr for ArtifactKey {
    type Err = Error;

    /// Parses the `classifier,id,version` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [classifier, id, version] if !classifier.is_empty() && !id.is_empty() => {
                Ok(ArtifactKey::new(*classifier, *id, Version::parse(version)?))
            }
            _ => Err(Error::config(format!(
                "Invalid artifact key {:?}, expected classifier,id,version",
                s
            ))),
        }
    }
}

/// Catalog entry for an artifact.
///
/// `properties` are the normalized, format-independent properties (size,
/// checksums, custom annotations). `repository_properties` carry
/// repository-format-specific metadata and only survive raw mirroring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub key: ArtifactKey,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repository_properties: BTreeMap<String, String>,
}

impl ArtifactDescriptor {
    pub fn new(key: ArtifactKey) -> Self {
        ArtifactDescriptor {
            key,
            properties: BTreeMap::new(),
            repository_properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Recorded checksum for `algorithm` (e.g. `sha-256`), if any.
    pub fn checksum(&self, algorithm: &str) -> Option<&str> {
        self.properties
            .get(&format!("{}{}", PROP_CHECKSUM_PREFIX, algorithm))
            .map(String::as_str)
    }

    pub fn size(&self) -> Option<u64> {
        self.properties.get(PROP_SIZE).and_then(|s| s.parse().ok())
    }

    /// Whether `name` is one of the properties the mirror recomputes itself.
    pub fn is_canonical_property(name: &str) -> bool {
        name == PROP_SIZE || name == PROP_FORMAT || name.starts_with(PROP_CHECKSUM_PREFIX)
    }

    /// Custom (non-canonical) properties.
    pub fn custom_properties(&self) -> impl Iterator<Item = (&String, &String)> {
        self.properties
            .iter()
            .filter(|(name, _)| !Self::is_canonical_property(name))
    }
}

/// Which catalog a repository reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    Metadata,
    Artifact,
}

/// A pointer from one repository to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub location: String,
    pub kind: RepositoryKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_unit_provides_itself() {
        let unit = Unit::new("lib", v("1.5"));
        let req = Requirement::unit("lib", VersionRange::parse("[1.0,2.0)").unwrap());
        assert!(req.is_satisfied_by(&unit));

        let too_new = Requirement::unit("lib", VersionRange::parse("[2.0,3.0)").unwrap());
        assert!(!too_new.is_satisfied_by(&unit));
    }

    #[test]
    fn test_requirement_matches_declared_capability() {
        let unit = Unit::new("impl", v("3.0")).provides(Capability::new("package", "org.api", v("1.2")));
        let req = Requirement::new("package", "org.api", VersionRange::parse("1.0").unwrap());
        assert!(req.is_satisfied_by(&unit));

        let other_ns = Requirement::new("service", "org.api", VersionRange::any());
        assert!(!other_ns.is_satisfied_by(&unit));
    }

    #[test]
    fn test_generic_capability_derives_name_and_version() {
        let mut attributes = BTreeMap::new();
        attributes.insert("osgi.ee".to_string(), serde_yaml::Value::from("JavaSE"));
        attributes.insert("version".to_string(), serde_yaml::Value::from("17.0"));
        let cap = Capability::generic("osgi.ee", attributes, BTreeMap::new());
        assert_eq!(cap.name, "JavaSE");
        assert_eq!(cap.version, v("17"));
        assert_eq!(cap.to_string(), "osgi.ee:JavaSE@17.0.0");

        let bare = Capability::generic("osgi.ee", BTreeMap::new(), BTreeMap::new());
        assert_eq!(bare.name, "");
        assert_eq!(bare.version, Version::ZERO);
    }

    #[test]
    fn test_strict_requirement() {
        let strict = Requirement::unit("a", VersionRange::exact(v("1.0")));
        let loose = Requirement::unit("a", VersionRange::any());
        assert!(strict.is_strict());
        assert!(!loose.is_strict());
    }

    #[test]
    fn test_artifact_key_display_and_parse() {
        let key = ArtifactKey::new("plugin", "org.lib", v("1.5"));
        assert_eq!(key.to_string(), "plugin,org.lib,1.5.0");
        assert_eq!("plugin, org.lib, 1.5".parse::<ArtifactKey>().unwrap(), key);
        assert!("plugin,org.lib".parse::<ArtifactKey>().is_err());
    }

    #[test]
    fn test_artifact_key_equality_is_structural() {
        let a = ArtifactKey::new("plugin", "x", v("1.0"));
        let b = ArtifactKey::new("plugin", "x", v("1.0.0"));
        assert_eq!(a, b);
        assert_ne!(a, ArtifactKey::new("feature", "x", v("1.0")));
    }

    #[test]
    fn test_descriptor_custom_properties() {
        let descriptor = ArtifactDescriptor::new(ArtifactKey::new("plugin", "x", v("1.0")))
            .with_property(PROP_SIZE, "12")
            .with_property("download.checksum.sha-256", "abc")
            .with_property("maven-groupId", "org.x");
        assert_eq!(descriptor.size(), Some(12));
        assert_eq!(descriptor.checksum("sha-256"), Some("abc"));
        let custom: Vec<_> = descriptor.custom_properties().collect();
        assert_eq!(custom.len(), 1);
        assert_eq!(custom[0].0, "maven-groupId");
    }

    #[test]
    fn test_unit_yaml_defaults() {
        let yaml = r#"
id: app
version: "1.0"
requirements:
  - name: lib
    range: "[1.0,2.0)"
  - namespace: package
    name: org.log
    optional: true
    greedy: false
artifacts:
  - classifier: plugin
    id: app
    version: "1.0"
filter: "(os=linux)"
"#;
        let unit: Unit = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(unit.requirements.len(), 2);
        assert_eq!(unit.requirements[0].namespace, UNIT_NAMESPACE);
        assert!(unit.requirements[0].greedy);
        assert!(!unit.requirements[0].optional);
        assert!(unit.requirements[1].optional);
        assert!(!unit.requirements[1].greedy);
        assert_eq!(unit.artifacts.len(), 1);
        assert!(unit.filter.is_some());
    }

    #[test]
    fn test_generic_capability_from_yaml() {
        let yaml = r#"
id: runtime
version: "1.0"
capabilities:
  - namespace: osgi.ee
    attributes:
      osgi.ee: JavaSE
      version: "17.0"
  - namespace: package
    name: org.api
    version: "2.1"
"#;
        let unit: Unit = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(unit.capabilities[0].name, "JavaSE");
        assert_eq!(unit.capabilities[0].version, v("17"));
        assert_eq!(unit.capabilities[1], Capability::new("package", "org.api", v("2.1")));

        let req = Requirement::new("osgi.ee", "JavaSE", VersionRange::parse("[17,18)").unwrap());
        assert!(req.is_satisfied_by(&unit));

        let reloaded: Unit = serde_yaml::from_str(&serde_yaml::to_string(&unit).unwrap()).unwrap();
        assert_eq!(reloaded.capabilities, unit.capabilities);
    }
}
