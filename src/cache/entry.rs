//! Cache keys, states and listed entries

use crate::model::{Coordinate, RelocationRuleSet, NO_RULES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory holding relocated artifacts, one subtree per rule-set hash
pub const RELOCATED_DIR: &str = "relocated";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Identity of a cached artifact: the coordinate plus the hash of the
/// relocation rules applied to it (`none` for the downloaded original)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub coordinate: Coordinate,
    pub rules: String,
}

impl CacheKey {
    /// Key of the artifact as downloaded
    pub fn original(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            rules: NO_RULES.to_string(),
        }
    }

    /// Key of the artifact after applying `rules`
    pub fn relocated(coordinate: Coordinate, rules: &RelocationRuleSet) -> Self {
        Self {
            coordinate,
            rules: rules.hash(),
        }
    }

    pub fn is_relocated(&self) -> bool {
        self.rules != NO_RULES
    }

    /// Path segments below the cache root
    pub fn path_segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        if self.is_relocated() {
            segments.push(RELOCATED_DIR.to_string());
            segments.push(self.rules.clone());
        }
        segments.extend(self.coordinate.path_segments());
        segments
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_relocated() {
            write!(f, "{}#{}", self.coordinate, self.rules)
        } else {
            write!(f, "{}", self.coordinate)
        }
    }
}

/// Lifecycle of a cache entry
///
/// | State | Meaning |
/// |-------|---------|
/// | Absent | Nothing on disk, nobody fetching |
/// | InFlight | A download is running for this key |
/// | Verifying | Bytes fetched, digest check running |
/// | Ready | Verified file at its final path |
/// | Failed | Last attempt failed and the failure has not expired |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Absent,
    InFlight,
    Verifying,
    Ready,
    Failed,
}

impl CacheState {
    /// Whether a fetch for this key is currently running
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::InFlight | Self::Verifying)
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::InFlight => write!(f, "in-flight"),
            Self::Verifying => write!(f, "verifying"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A file found in the cache directory
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Path relative to the cache root, `/`-separated
    pub path: String,
    /// Rule-set hash for relocated artifacts
    pub relocation: Option<String>,
    /// Size in bytes
    pub size_bytes: u64,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
}

/// Persisted record of a failed fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMarker {
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}
