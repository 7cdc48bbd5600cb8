//! # Error Handling
//!
//! This module defines the centralized error type for `unit-mirror`. It uses
//! `thiserror` to build a single `Error` enum covering every failure that can
//! interrupt control flow.
//!
//! Failures of individual artifact transfers are *not* represented here: the
//! mirror engine records those as task outcomes in a
//! [`MirrorReport`](crate::mirror::MirrorReport). Only the following stop a run:
//!
//! - Configuration errors, raised before any work starts.
//! - Repository open/read/write failures of the catalog itself.
//! - `Lookup` failures while slicing.
//! - Planner failures in install-time-like resolution.
//! - Cancellation through a [`CancelToken`](crate::cancel::CancelToken).
//! - Metadata batch failures (the batch is atomic).

use thiserror::Error;

/// Main error type for unit-mirror operations
#[derive(Error, Debug)]
pub enum Error {
    /// The run configuration is invalid or incomplete.
    ///
    /// Raised before any repository is touched. An optional hint explains how
    /// to fix the configuration.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A repository could not be opened, read or written.
    #[error("Repository error for {location}: {message}")]
    Repository { location: String, message: String },

    /// The metadata lookup used by the slicer failed.
    #[error("Lookup failed for {requirement}: {message}")]
    Lookup {
        requirement: String,
        message: String,
    },

    /// An artifact stream could not be opened or written.
    #[error("Artifact error for {key}: {message}")]
    Artifact { key: String, message: String },

    /// A filter expression could not be parsed.
    #[error("Invalid filter {expression:?}: {message}")]
    Filter { expression: String, message: String },

    /// A version or version range could not be parsed.
    #[error("Invalid version {input:?}: {message}")]
    VersionParse { input: String, message: String },

    /// No comparator is registered under the requested identifier.
    #[error("Unknown comparator: {id}")]
    UnknownComparator { id: String },

    /// The external planner failed to produce a plan.
    #[error("Planner error: {message}")]
    Planner { message: String },

    /// The run was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a repository error.
    pub fn repository(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Repository {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
