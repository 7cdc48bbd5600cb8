//! # Unit Mirror Library
//!
//! This library computes the dependency closure of versioned units in a
//! metadata repository and mirrors the closure's artifacts and metadata into
//! a destination repository, verifying every transfer. It is used by the
//! `unit-mirror` command-line tool but can be embedded in other programs.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use unit_mirror::cancel::CancelToken;
//! use unit_mirror::model::{Requirement, Unit};
//! use unit_mirror::repository::{MemoryMetadataRepository, MetadataRepository, RepositoryLookup};
//! use unit_mirror::slicer::{Slicer, SlicingPolicy};
//! use unit_mirror::version::{Version, VersionRange};
//!
//! let repository = MemoryMetadataRepository::with_units(
//!     "memory",
//!     vec![
//!         Unit::new("app", Version::parse("1.0").unwrap())
//!             .requires(Requirement::unit("lib", VersionRange::parse("[1.0,2.0)").unwrap())),
//!         Unit::new("lib", Version::parse("1.5").unwrap()),
//!     ],
//! );
//! let roots: Vec<Arc<Unit>> = repository.units().unwrap()[..1].to_vec();
//! let lookup = RepositoryLookup::new(&repository);
//! let outcome = Slicer::new(&lookup, SlicingPolicy::default())
//!     .slice(&roots, &CancelToken::new())
//!     .unwrap();
//! assert_eq!(outcome.closure.len(), 2);
//! assert!(outcome.status.is_ok());
//! ```
//!
//! ## Core Concepts
//!
//! - **Model (`model`, `version`, `filter`)**: units with capabilities,
//!   requirements and artifact keys; versions and ranges; LDAP-style filters
//!   evaluated against a target environment.
//! - **Slicing (`slicer`)**: a breadth-first traversal from root units over
//!   requirement edges, governed by a [`SlicingPolicy`](slicer::SlicingPolicy).
//! - **Planning (`planner`)**: install-time-like resolution through a
//!   [`Planner`](planner::Planner) instead of the slicer.
//! - **Repositories (`repository`)**: metadata and artifact repository traits
//!   with in-memory, composite and on-disk implementations.
//! - **Comparison (`comparator`)**: pluggable content comparators selected by
//!   id.
//! - **Mirroring (`mirror`, `mirror_log`)**: the artifact engine with
//!   fail-fast or best-effort failure handling, metadata mirroring, and per-run
//!   log files.
//! - **Application (`app`, `config`)**: a full run driven by a
//!   [`MirrorConfig`](config::MirrorConfig).
//!
//! ## Execution Flow
//!
//! 1.  **Validate** the configuration.
//! 2.  **Open** sources, destinations and the optional baseline.
//! 3.  **Resolve** root specifications to root units.
//! 4.  **Slice** (or plan) the closure of the roots.
//! 5.  **Mirror artifacts** of the closure, verifying each transfer.
//! 6.  **Mirror metadata** of the closure and the source references.

pub mod app;
pub mod cancel;
pub mod comparator;
pub mod config;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod mirror;
pub mod mirror_log;
pub mod model;
pub mod output;
pub mod planner;
pub mod repository;
pub mod slicer;
pub mod status;
pub mod version;

#[cfg(test)]
mod slicer_proptest;
