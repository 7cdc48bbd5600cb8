//! # Content Comparators
//!
//! A comparator decides whether two artifact byte streams are equivalent.
//! Strategies are registered under a string identifier in a
//! [`ComparatorRegistry`] and resolved once when a mirror engine is built.
//!
//! Built-in strategies:
//!
//! - `sha-256` (default) and `sha-512`: digest both streams incrementally and
//!   compare the digests. Neither stream is buffered in full.
//! - `bytes`: compare the streams chunk by chunk and stop at the first
//!   difference.
//!
//! A read failure on either stream yields [`Comparison::Failed`], which is
//! distinct from [`Comparison::Different`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use glob::Pattern;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};
use crate::model::ArtifactKey;

const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of comparing two streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    /// The streams differ; the payload describes how.
    Different(String),
    /// At least one stream could not be read.
    Failed(String),
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Equal => f.write_str("equal"),
            Comparison::Different(detail) => write!(f, "different ({})", detail),
            Comparison::Failed(reason) => write!(f, "comparison failed ({})", reason),
        }
    }
}

/// Pluggable equality test between two artifact streams.
pub trait ContentComparator: Send + Sync {
    /// Identifier the comparator is registered under.
    fn id(&self) -> &str;

    fn compare(&self, left: &mut dyn Read, right: &mut dyn Read) -> Comparison;
}

/// Digest algorithms understood by the mirror.
///
/// The names match the suffix of `download.checksum.<name>` descriptor
/// properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 2] = [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Sha512];

    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha-256",
            ChecksumAlgorithm::Sha512 => "sha-512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.name() == name)
    }

    /// Hex digest of everything `reader` yields.
    pub fn digest_hex(self, reader: &mut dyn Read) -> io::Result<String> {
        match self {
            ChecksumAlgorithm::Sha256 => digest_stream::<Sha256>(reader),
            ChecksumAlgorithm::Sha512 => digest_stream::<Sha512>(reader),
        }
    }
}

fn digest_stream<D: Digest>(reader: &mut dyn Read) -> io::Result<String> {
    let mut digesting = DigestingReader::<_, D>::new(reader);
    io::copy(&mut digesting, &mut io::sink())?;
    Ok(digesting.finalize_hex())
}

/// A reader that hashes everything read through it.
///
/// Lets a transfer compute the checksum of the bytes it copies in the same
/// pass.
pub struct DigestingReader<R, D> {
    inner: R,
    hasher: D,
    bytes: u64,
}

impl<R: Read, D: Digest> DigestingReader<R, D> {
    pub fn new(inner: R) -> Self {
        DigestingReader {
            inner,
            hasher: D::new(),
            bytes: 0,
        }
    }

    /// Number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read, D: Digest> Read for DigestingReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Compares digests of both streams.
pub struct ChecksumComparator {
    algorithm: ChecksumAlgorithm,
}

impl ChecksumComparator {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        ChecksumComparator { algorithm }
    }
}

impl ContentComparator for ChecksumComparator {
    fn id(&self) -> &str {
        self.algorithm.name()
    }

    fn compare(&self, left: &mut dyn Read, right: &mut dyn Read) -> Comparison {
        let left = match self.algorithm.digest_hex(left) {
            Ok(digest) => digest,
            Err(e) => return Comparison::Failed(format!("reading first stream: {}", e)),
        };
        let right = match self.algorithm.digest_hex(right) {
            Ok(digest) => digest,
            Err(e) => return Comparison::Failed(format!("reading second stream: {}", e)),
        };
        if left == right {
            Comparison::Equal
        } else {
            Comparison::Different(format!("{} {} != {}", self.algorithm.name(), left, right))
        }
    }
}

/// Byte-by-byte comparison, stopping at the first difference.
pub struct BytesComparator;

impl BytesComparator {
    pub const ID: &'static str = "bytes";
}

/// Reads until `buf` is full or the stream ends.
fn fill(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl ContentComparator for BytesComparator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn compare(&self, left: &mut dyn Read, right: &mut dyn Read) -> Comparison {
        let mut left_buf = vec![0u8; CHUNK_SIZE];
        let mut right_buf = vec![0u8; CHUNK_SIZE];
        let mut offset: u64 = 0;
        loop {
            let l = match fill(left, &mut left_buf) {
                Ok(n) => n,
                Err(e) => return Comparison::Failed(format!("reading first stream: {}", e)),
            };
            let r = match fill(right, &mut right_buf) {
                Ok(n) => n,
                Err(e) => return Comparison::Failed(format!("reading second stream: {}", e)),
            };
            if let Some(pos) = left_buf[..l]
                .iter()
                .zip(&right_buf[..r])
                .position(|(a, b)| a != b)
            {
                return Comparison::Different(format!(
                    "content differs at byte {}",
                    offset + pos as u64
                ));
            }
            if l != r {
                return Comparison::Different(format!(
                    "lengths differ after byte {}",
                    offset + l.min(r) as u64
                ));
            }
            if l == 0 {
                return Comparison::Equal;
            }
            offset += l as u64;
        }
    }
}

/// Comparators available to a run, keyed by id.
pub struct ComparatorRegistry {
    comparators: BTreeMap<String, Arc<dyn ContentComparator>>,
}

impl ComparatorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        ComparatorRegistry {
            comparators: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, comparator: Arc<dyn ContentComparator>) {
        self.comparators
            .insert(comparator.id().to_string(), comparator);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ContentComparator>> {
        self.comparators
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownComparator { id: id.to_string() })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.comparators.keys().map(String::as_str)
    }
}

impl Default for ComparatorRegistry {
    /// The built-in checksum and byte comparators.
    fn default() -> Self {
        let mut registry = Self::empty();
        for algorithm in ChecksumAlgorithm::ALL {
            registry.register(Arc::new(ChecksumComparator::new(algorithm)));
        }
        registry.register(Arc::new(BytesComparator));
        registry
    }
}

/// Artifact keys whose content is never compared.
///
/// Patterns are globs over the `classifier,id,version` form of a key, e.g.
/// `binary,*,*` or `plugin,org.example.generated,*`.
#[derive(Debug, Clone, Default)]
pub struct CompareExclusions {
    patterns: Vec<Pattern>,
}

impl CompareExclusions {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(CompareExclusions { patterns })
    }

    pub fn is_excluded(&self, key: &ArtifactKey) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let text = key.to_string();
        self.patterns.iter().any(|p| p.matches(&text))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// A resolved comparator together with its exclusions.
#[derive(Clone)]
pub struct ArtifactComparator {
    comparator: Arc<dyn ContentComparator>,
    exclusions: CompareExclusions,
}

impl ArtifactComparator {
    pub fn new(comparator: Arc<dyn ContentComparator>, exclusions: CompareExclusions) -> Self {
        ArtifactComparator {
            comparator,
            exclusions,
        }
    }

    pub fn id(&self) -> &str {
        self.comparator.id()
    }

    pub fn is_excluded(&self, key: &ArtifactKey) -> bool {
        self.exclusions.is_excluded(key)
    }

    /// Compares the two streams of `key`; excluded keys are always equal.
    pub fn compare(&self, key: &ArtifactKey, left: &mut dyn Read, right: &mut dyn Read) -> Comparison {
        if self.is_excluded(key) {
            return Comparison::Equal;
        }
        self.comparator.compare(left, right)
    }
}

impl fmt::Debug for ArtifactComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactComparator")
            .field("id", &self.comparator.id())
            .field("exclusions", &self.exclusions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    /// A reader that fails after yielding `ok_bytes`.
    struct BrokenReader {
        ok_bytes: usize,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok_bytes == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            let n = self.ok_bytes.min(buf.len());
            buf[..n].fill(b'x');
            self.ok_bytes -= n;
            Ok(n)
        }
    }

    fn key(classifier: &str, id: &str) -> ArtifactKey {
        ArtifactKey::new(classifier, id, Version::parse("1.0").unwrap())
    }

    #[test]
    fn test_checksum_comparator_equal_and_different() {
        let cmp = ChecksumComparator::new(ChecksumAlgorithm::Sha256);
        assert_eq!(
            cmp.compare(&mut &b"hello"[..], &mut &b"hello"[..]),
            Comparison::Equal
        );
        let result = cmp.compare(&mut &b"hello"[..], &mut &b"world"[..]);
        assert!(matches!(result, Comparison::Different(ref d) if d.starts_with("sha-256")));
    }

    #[test]
    fn test_read_error_is_failed_not_different() {
        let comparators: Vec<Arc<dyn ContentComparator>> = vec![
            Arc::new(ChecksumComparator::new(ChecksumAlgorithm::Sha512)),
            Arc::new(BytesComparator),
        ];
        for cmp in comparators {
            let result = cmp.compare(&mut &b"abc"[..], &mut BrokenReader { ok_bytes: 2 });
            assert!(matches!(result, Comparison::Failed(_)), "{}: {:?}", cmp.id(), result);
        }
    }

    #[test]
    fn test_bytes_comparator_reports_offset() {
        let cmp = BytesComparator;
        assert_eq!(cmp.compare(&mut &b""[..], &mut &b""[..]), Comparison::Equal);
        assert_eq!(
            cmp.compare(&mut &b"abcdef"[..], &mut &b"abcXef"[..]),
            Comparison::Different("content differs at byte 3".to_string())
        );
        assert!(matches!(
            cmp.compare(&mut &b"abc"[..], &mut &b"abcd"[..]),
            Comparison::Different(_)
        ));
    }

    #[test]
    fn test_bytes_comparator_large_streams() {
        let data = vec![7u8; CHUNK_SIZE * 3 + 11];
        let cmp = BytesComparator;
        assert!(cmp.compare(&mut &data[..], &mut &data[..]).is_equal());
    }

    #[test]
    fn test_digesting_reader_matches_one_shot_digest() {
        let data = b"the quick brown fox";
        let mut reader = DigestingReader::<_, Sha256>::new(&data[..]);
        let mut copy = Vec::new();
        io::copy(&mut reader, &mut copy).unwrap();
        assert_eq!(reader.bytes_read(), data.len() as u64);
        assert_eq!(copy, data);
        assert_eq!(reader.finalize_hex(), hex::encode(Sha256::digest(data)));
    }

    #[test]
    fn test_algorithm_names_round_trip() {
        for alg in ChecksumAlgorithm::ALL {
            assert_eq!(ChecksumAlgorithm::from_name(alg.name()), Some(alg));
        }
        assert_eq!(ChecksumAlgorithm::from_name("md5"), None);
    }

    #[test]
    fn test_registry_resolves_builtin_ids() {
        let registry = ComparatorRegistry::default();
        assert_eq!(registry.get("sha-256").unwrap().id(), "sha-256");
        assert_eq!(registry.get("bytes").unwrap().id(), "bytes");
        assert_eq!(registry.ids().count(), 3);
        assert!(matches!(
            registry.get("md5"),
            Err(Error::UnknownComparator { ref id }) if id == "md5"
        ));
    }

    #[test]
    fn test_exclusions_treat_artifact_as_equal() {
        let exclusions = CompareExclusions::new(&["binary,*"]).unwrap();
        let cmp = ArtifactComparator::new(
            Arc::new(ChecksumComparator::new(ChecksumAlgorithm::Sha256)),
            exclusions,
        );
        assert!(cmp
            .compare(&key("binary", "launcher"), &mut &b"a"[..], &mut &b"b"[..])
            .is_equal());
        assert!(!cmp
            .compare(&key("plugin", "launcher"), &mut &b"a"[..], &mut &b"b"[..])
            .is_equal());
    }

    #[test]
    fn test_invalid_exclusion_pattern() {
        assert!(matches!(
            CompareExclusions::new(&["[unclosed"]),
            Err(Error::Glob(_))
        ));
    }
}
