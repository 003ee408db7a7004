//! Resolved artifacts

use crate::integrity::Verification;
use crate::model::Coordinate;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A coordinate that is available on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
    pub coordinate: Coordinate,
    /// Repository that served it; `None` when it came from the cache
    pub repository: Option<String>,
    /// Hex SHA-256 of the downloaded bytes, when downloaded in this run
    pub sha256: Option<String>,
    #[serde(serialize_with = "serialize_verification")]
    pub verification: Option<Verification>,
    /// Final local path
    pub path: PathBuf,
    /// Whether `path` points at a relocated copy
    pub relocated: bool,
    /// Whether no network request was made for it
    pub from_cache: bool,
}

impl ResolvedArtifact {
    /// An artifact found ready in the cache
    pub fn cached(coordinate: Coordinate, path: PathBuf) -> Self {
        Self {
            coordinate,
            repository: None,
            sha256: None,
            verification: None,
            path,
            relocated: false,
            from_cache: true,
        }
    }

    /// Same artifact, now served from its relocated copy
    pub fn into_relocated(self, path: PathBuf) -> Self {
        Self {
            path,
            relocated: true,
            ..self
        }
    }
}

fn serialize_verification<S>(value: &Option<Verification>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(v) => serializer.serialize_some(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

impl fmt::Display for ResolvedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.coordinate, self.path.display())
    }
}
