//! Shared test utilities for integration and E2E tests.
//!
//! [`RepoFixture`] owns a temporary directory and writes on-disk source
//! repositories into it through the library's directory repositories.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = RepoFixture::new().with_sample_source("src");
//! fixture
//!     .command()
//!     .args(["mirror", "--source", &fixture.location("src")])
//!     .assert()
//!     .success();
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_fs::prelude::*;

use unit_mirror::comparator::ChecksumAlgorithm;
use unit_mirror::model::{
    ArtifactDescriptor, ArtifactKey, RepositoryKind, RepositoryReference, Requirement, Unit,
    PROP_CHECKSUM_PREFIX, PROP_SIZE,
};
use unit_mirror::repository::{
    ArtifactRepository, DirectoryArtifactRepository, DirectoryMetadataRepository,
    MetadataRepository,
};
use unit_mirror::version::{Version, VersionRange};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{artifact_bytes, binary_key, sample_units, RepoFixture};
}

pub fn v(s: &str) -> Version {
    Version::parse(s).expect("valid version")
}

pub fn binary_key(id: &str, version: &str) -> ArtifactKey {
    ArtifactKey::new("binary", id, v(version))
}

/// Content stored for `key` by the fixture.
pub fn artifact_bytes(key: &ArtifactKey) -> Vec<u8> {
    format!("content of {}\n", key).into_bytes()
}

/// `app 1.0` requires `lib [1.0,2.0)`, offered as 1.0 and 1.5; `lib 1.5`
/// optionally requires `docs`; `tool 3.0` is unrelated. Every unit carries
/// one binary artifact.
pub fn sample_units() -> Vec<Unit> {
    vec![
        Unit::new("app", v("1.0"))
            .requires(Requirement::unit(
                "lib",
                VersionRange::parse("[1.0,2.0)").expect("valid range"),
            ))
            .with_artifact(binary_key("app", "1.0")),
        Unit::new("lib", v("1.0")).with_artifact(binary_key("lib", "1.0")),
        Unit::new("lib", v("1.5"))
            .requires(Requirement::unit("docs", VersionRange::any()).optional())
            .with_artifact(binary_key("lib", "1.5")),
        Unit::new("docs", v("1.0")).with_artifact(binary_key("docs", "1.0")),
        Unit::new("tool", v("3.0")).with_artifact(binary_key("tool", "3.0")),
    ]
}

/// A descriptor recording the sha-256 and size of `bytes`.
pub fn descriptor_for(key: &ArtifactKey, bytes: &[u8]) -> ArtifactDescriptor {
    let sha = ChecksumAlgorithm::Sha256
        .digest_hex(&mut &bytes[..])
        .expect("hashing a slice");
    ArtifactDescriptor::new(key.clone())
        .with_property(PROP_SIZE, bytes.len().to_string())
        .with_property(format!("{}sha-256", PROP_CHECKSUM_PREFIX), sha)
}

/// A temporary directory holding directory repositories.
pub struct RepoFixture {
    temp_dir: assert_fs::TempDir,
}

impl RepoFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of the repository `name`, as a locator string.
    pub fn location(&self, name: &str) -> String {
        self.repo_path(name).display().to_string()
    }

    pub fn repo_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `units` and their artifacts (see [`artifact_bytes`]) as the
    /// repository `name`, with one reference to `file:///updates`.
    pub fn with_source(self, name: &str, units: Vec<Unit>) -> Self {
        let root = self.repo_path(name);
        let metadata =
            DirectoryMetadataRepository::create(&root, false).expect("create metadata repository");
        let artifacts =
            DirectoryArtifactRepository::create(&root, false).expect("create artifact repository");

        for unit in &units {
            for key in &unit.artifacts {
                let bytes = artifact_bytes(key);
                write_artifact(&artifacts, &descriptor_for(key, &bytes), &bytes);
            }
        }
        let units: Vec<Arc<Unit>> = units.into_iter().map(Arc::new).collect();
        metadata.add_units(&units).expect("add units");
        metadata
            .add_references(&[RepositoryReference {
                location: "file:///updates".to_string(),
                kind: RepositoryKind::Metadata,
                enabled: true,
            }])
            .expect("add references");
        self
    }

    pub fn with_sample_source(self, name: &str) -> Self {
        self.with_source(name, sample_units())
    }

    /// Adds a YAML file with the given content.
    #[allow(dead_code)]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    pub fn open_metadata(&self, name: &str) -> DirectoryMetadataRepository {
        DirectoryMetadataRepository::open(&self.repo_path(name)).expect("open metadata")
    }

    pub fn open_artifacts(&self, name: &str) -> DirectoryArtifactRepository {
        DirectoryArtifactRepository::open(&self.repo_path(name)).expect("open artifacts")
    }

    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("unit-mirror");
        cmd.current_dir(self.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

impl Default for RepoFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Streams `bytes` into `repository` under `descriptor`.
pub fn write_artifact(repository: &dyn ArtifactRepository, descriptor: &ArtifactDescriptor, bytes: &[u8]) {
    use std::io::Write;
    let mut sink = repository.write(&descriptor.key).expect("open sink");
    sink.write_all(bytes).expect("write artifact");
    sink.commit(descriptor.clone()).expect("commit artifact");
    repository.flush().expect("write artifact index");
}
