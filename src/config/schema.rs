//! Configuration schema for plugdeps
//!
//! Configuration is stored at `~/.config/plugdeps/config.toml`

use crate::model::Repository;
use crate::resolve::MediationPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Download settings
    pub download: DownloadConfig,

    /// Repository defaults
    pub repositories: RepositoriesConfig,

    /// Transitive resolution settings
    pub resolve: ResolveConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,

    /// Override the audit log location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
            audit_log_path: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root (default: `~/.cache/plugdeps`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Remember failed coordinates for this many seconds (0 = always retry)
    pub failure_ttl_secs: u64,
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum simultaneous downloads
    pub max_concurrent: usize,

    /// Per-attempt timeout in seconds
    pub attempt_timeout_secs: u64,

    /// Retries per repository for transient failures
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    pub backoff_max_ms: u64,

    /// Largest artifact accepted, in bytes
    pub max_artifact_bytes: u64,

    /// User-Agent sent to repositories
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            attempt_timeout_secs: 30,
            max_retries: 2,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            max_artifact_bytes: 256 * 1024 * 1024,
            user_agent: format!("plugdeps/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Repositories used when a request names none
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoriesConfig {
    /// Fallback order
    pub default: Vec<Repository>,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            default: vec![Repository::maven_central()],
        }
    }
}

/// Transitive resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// How competing versions of one module are settled
    pub mediation: MediationPolicy,

    /// Deepest transitive level followed
    pub max_depth: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            mediation: MediationPolicy::NearestWins,
            max_depth: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::known;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[download]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.download.max_concurrent, 4);
        assert_eq!(config.repositories.default[0].url(), known::MAVEN_CENTRAL);
        assert_eq!(config.cache.failure_ttl_secs, 0);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [download]
            max_concurrent = 8

            [repositories]
            default = ["https://maven.google.com"]

            [resolve]
            mediation = "highest-version"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.download.max_concurrent, 8);
        assert_eq!(config.download.attempt_timeout_secs, 30); // default preserved
        assert_eq!(config.repositories.default[0].url(), known::GOOGLE_MAVEN);
        assert_eq!(config.resolve.mediation, MediationPolicy::HighestVersion);
    }
}
