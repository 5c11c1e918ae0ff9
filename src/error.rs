//! # Error Handling
//!
//! This module defines the centralized error type for `deps-vendor`. It uses
//! the `thiserror` library to describe every failure mode the resolver can
//! hit, with enough context (paths, urls, revisions) for an operator to act
//! on the message without re-running in debug mode.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum covering all failure modes.
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Severity
//!
//! Most variants abort a resolution run:
//!
//! - `MalformedManifest` and `InvalidCondition` abort immediately, since a
//!   partially understood manifest could silently drop a transitive source.
//! - `ConflictingDependency` carries both descriptors so the two disagreeing
//!   manifests can be reviewed.
//! - `FetchFailure` is only raised after the fetcher has exhausted its retries.
//! - `Cancelled` is distinct from both success and failure.
//!
//! `UnsupportedKind` is the exception: the resolver records it as a warning
//! and keeps going. The variant exists so callers that want to treat warnings
//! as errors (`--deny-warnings`) have something to return.

use thiserror::Error;

/// Main error type for deps-vendor operations
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest could not be decoded into dependency declarations.
    #[error("Malformed manifest {source_name}: {message}")]
    MalformedManifest {
        /// Where the manifest came from (file path or `<root>`)
        source_name: String,
        message: String,
    },

    /// A condition expression could not be evaluated.
    #[error("Invalid condition '{condition}': {message}")]
    InvalidCondition { condition: String, message: String },

    /// Two manifests pin different sources at the same path.
    #[error("Conflicting dependency at {path}: {existing} vs {conflicting}")]
    ConflictingDependency {
        path: String,
        /// The descriptor recorded first
        existing: String,
        /// The descriptor discovered later
        conflicting: String,
    },

    /// Fetching or hashing a source failed after all retries.
    #[error("Fetch failed for {url}@{revision}: {message}")]
    FetchFailure {
        url: String,
        revision: String,
        message: String,
    },

    /// A dependency kind the output format cannot express.
    #[error("Unsupported dependency kind '{dep_type}' at {path}")]
    UnsupportedKind { path: String, dep_type: String },

    /// The run was cancelled or timed out.
    #[error("Resolution cancelled")]
    Cancelled,

    /// A revision already present in the cache was stored with a different hash.
    #[error("Cache inconsistency for revision {revision}: cached {cached}, fetched {fetched}")]
    CacheInconsistency {
        revision: String,
        cached: String,
        fetched: String,
    },

    /// A `.tar.gz.sha1` sidecar digest could not be read.
    #[error("Sidecar digest error for {path}: {message}")]
    Sidecar { path: String, message: String },

    /// A fetched copy could not be linked into the workspace.
    #[error("Failed to materialize {path}: {message}")]
    Materialize { path: String, message: String },

    /// An error occurred while parsing the `.deps-vendor.yaml` configuration file.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
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
}

impl Error {
    /// Shorthand for a `MalformedManifest` error.
    pub fn malformed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedManifest {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an `InvalidCondition` error.
    pub fn invalid_condition(condition: &str, message: impl Into<String>) -> Self {
        Error::InvalidCondition {
            condition: condition.to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors a fetcher may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::FetchFailure { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
