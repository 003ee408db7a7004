//! Error types for plugdeps
//!
//! All modules use `PlugdepsResult<T>` as their return type. Every variant
//! maps onto one [`ErrorKind`] so callers can branch on the failure class
//! without matching individual variants.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for plugdeps operations
pub type PlugdepsResult<T> = Result<T, PlugdepsError>;

/// Failure class of a [`PlugdepsError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed coordinate, rule, repository or config, caught before I/O
    Configuration,
    /// Every repository exhausted for a coordinate
    Download,
    /// Digest mismatch
    Integrity,
    /// Unparseable artifact during namespace rewrite
    Relocation,
    /// Disk failure in the cache directory
    Cache,
    /// Transitive conflict the mediation policy cannot settle
    Resolution,
    /// The loader bridge refused an artifact
    Load,
    /// Caller-level timeout elapsed
    Timeout,
    /// One or more dependencies of a request failed
    Aggregate,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Download => "download",
            Self::Integrity => "integrity",
            Self::Relocation => "relocation",
            Self::Cache => "cache",
            Self::Resolution => "resolution",
            Self::Load => "load",
            Self::Timeout => "timeout",
            Self::Aggregate => "aggregate",
        };
        write!(f, "{}", name)
    }
}

/// One failed attempt against a single repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// Repository base URL
    pub repository: String,
    /// What went wrong
    pub reason: String,
    /// Whether the bytes were fetched but failed verification
    pub integrity: bool,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.repository, self.reason)
    }
}

/// A dependency that failed inside a multi-dependency request
#[derive(Debug, Clone)]
pub struct DependencyFailure {
    /// Coordinate string (`group:artifact:version`)
    pub coordinate: String,
    /// Underlying failure
    pub error: PlugdepsError,
}

/// All errors that can occur in plugdeps
#[derive(Error, Debug, Clone)]
pub enum PlugdepsError {
    // Configuration errors
    #[error("Invalid coordinate '{input}': {reason}")]
    InvalidCoordinate { input: String, reason: String },

    #[error("Invalid repository '{url}': {reason}")]
    InvalidRepository { url: String, reason: String },

    #[error("Invalid relocation rule '{from}' -> '{to}': {reason}")]
    InvalidRelocation {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid checksum for {coordinate}: {reason}")]
    InvalidChecksum { coordinate: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Download errors
    #[error("Failed to download {coordinate} after {attempts} attempt(s): {last}")]
    DownloadFailed {
        coordinate: String,
        attempts: u32,
        last: String,
        failures: Vec<AttemptFailure>,
    },

    #[error("Repository {url} unreachable: {reason}")]
    RepositoryUnreachable { url: String, reason: String },

    #[error("Repository {url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    AttemptTimeout { url: String },

    #[error("Artifact {url} exceeds the {limit} byte limit")]
    ArtifactTooLarge { url: String, limit: u64 },

    #[error("{coordinate} failed recently and is not retried until the failure expires")]
    RecentlyFailed { coordinate: String },

    // Integrity errors
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    // Relocation errors
    #[error("Cannot relocate {path}: {reason}")]
    Relocation { path: PathBuf, reason: String },

    // Cache errors
    #[error("Cache error at {path}: {context}")]
    Cache {
        path: PathBuf,
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Resolution errors
    #[error("Cannot mediate versions of {module}: {versions}")]
    VersionConflict { module: String, versions: String },

    #[error("Invalid POM for {coordinate}: {reason}")]
    PomInvalid { coordinate: String, reason: String },

    // Loader errors
    #[error("Loader could not inject {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    // Request-level errors
    #[error("Resolution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{}", summarize(.0))]
    Aggregate(Vec<DependencyFailure>),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML error: {0}")]
    Toml(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(failures: &[DependencyFailure]) -> String {
    let noun = if failures.len() == 1 {
        "dependency"
    } else {
        "dependencies"
    };
    let details = failures
        .iter()
        .map(|f| format!("{} ({})", f.coordinate, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} required {} failed: {}", failures.len(), noun, details)
}

impl From<serde_json::Error> for PlugdepsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<toml::de::Error> for PlugdepsError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

impl From<toml::ser::Error> for PlugdepsError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

impl PlugdepsError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a cache error for a path
    pub fn cache(path: impl Into<PathBuf>, context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Cache {
            path: path.into(),
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a relocation error for an artifact
    pub fn relocation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Relocation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCoordinate { .. }
            | Self::InvalidRepository { .. }
            | Self::InvalidRelocation { .. }
            | Self::InvalidChecksum { .. }
            | Self::InvalidRequest(_)
            | Self::ConfigInvalid { .. }
            | Self::ConfigDirCreate { .. }
            | Self::Toml(_) => ErrorKind::Configuration,

            Self::DownloadFailed { failures, .. } => {
                if failures.iter().any(|f| f.integrity) {
                    ErrorKind::Integrity
                } else {
                    ErrorKind::Download
                }
            }
            Self::RepositoryUnreachable { .. }
            | Self::HttpStatus { .. }
            | Self::AttemptTimeout { .. }
            | Self::ArtifactTooLarge { .. }
            | Self::RecentlyFailed { .. } => ErrorKind::Download,

            Self::ChecksumMismatch { .. } => ErrorKind::Integrity,
            Self::Relocation { .. } => ErrorKind::Relocation,
            Self::Cache { .. } | Self::Io { .. } | Self::Json(_) | Self::Internal(_) => {
                ErrorKind::Cache
            }
            Self::VersionConflict { .. } | Self::PomInvalid { .. } => ErrorKind::Resolution,
            Self::Load { .. } => ErrorKind::Load,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Aggregate(_) => ErrorKind::Aggregate,
        }
    }

    /// Check if error is a transient network failure worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RepositoryUnreachable { .. } | Self::AttemptTimeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Failures carried by an aggregate error (empty for other variants)
    pub fn failures(&self) -> &[DependencyFailure] {
        match self {
            Self::Aggregate(failures) => failures,
            _ => &[],
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCoordinate { .. } => {
                Some("Coordinates look like group:artifact:version[:classifier][@extension]")
            }
            Self::DownloadFailed { .. } => Some("Check the repository list and network access"),
            Self::ChecksumMismatch { .. } => {
                Some("The mirror served different bytes than expected; do not disable verification")
            }
            Self::Cache { .. } => Some("Check free space and permissions of the cache directory"),
            Self::RecentlyFailed { .. } => Some("Run: plugdeps cache invalidate <coordinate>"),
            _ => None,
        }
    }
}
