//! Default values for unit-mirror configuration.
//!
//! This module provides centralized default values used across the library
//! and the command line, ensuring consistency and avoiding duplication.

use std::num::NonZeroUsize;

/// Comparator used when none is configured.
pub const DEFAULT_COMPARATOR: &str = "sha-256";

/// Checksum recomputed for every normalized (non-raw) transfer.
pub const DEFAULT_CHECKSUM: &str = "sha-256";

/// Index of units and references in a directory repository.
pub const METADATA_INDEX_FILE: &str = "content.yaml";

/// Index of artifact descriptors in a directory repository.
pub const ARTIFACT_INDEX_FILE: &str = "artifacts.yaml";

/// Prefix of the throw-away profile created for install-time-like resolution.
pub const PLANNER_PROFILE_PREFIX: &str = "mirror-";

/// Upper bound for the default number of concurrent transfers.
const MAX_DEFAULT_PARALLELISM: usize = 4;

/// Returns the default number of concurrent artifact transfers.
///
/// Uses the available parallelism of the host, capped at four since
/// transfers are I/O-bound. Falls back to 1 when the parallelism cannot be
/// determined.
///
/// This can be overridden by the `--jobs` CLI flag or the `parallelism`
/// configuration key.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(MAX_DEFAULT_PARALLELISM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parallelism_is_bounded() {
        let parallelism = default_parallelism();
        assert!(parallelism >= 1);
        assert!(parallelism <= MAX_DEFAULT_PARALLELISM);
    }

    #[test]
    fn test_index_files_differ() {
        assert_ne!(METADATA_INDEX_FILE, ARTIFACT_INDEX_FILE);
    }
}
