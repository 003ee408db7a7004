//! Resolution requests
//!
//! A request names the repositories to try (in order), the dependencies to
//! fetch, and the relocation rules to apply to every one of them. A
//! dependency may add repositories and rules of its own; those apply to it
//! and to everything it pulls in. Requests can be built in code or read from
//! a TOML file:
//!
//! ```toml
//! repositories = ["https://repo1.maven.org/maven2/"]
//! timeout_secs = 120
//!
//! [[dependencies]]
//! coordinate = "org{}apache{}commons:commons-lang3:3.14.0"
//! checksum = "e5a/PuaJSau1vEZVWawnDgVRWW+jRSP934kOxBjd4Tw="
//!
//! [[dependencies]]
//! coordinate = "com.example:private-lib:2.0"
//! repositories = ["https://maven.example.com/releases/"]
//!
//! [[relocations]]
//! from = "org{}apache{}commons{}lang3"
//! to = "my.plugin.libs.lang3"
//! ```

use crate::error::{PlugdepsError, PlugdepsResult};
use crate::integrity::ExpectedDigest;
use crate::model::{Coordinate, ModuleId, RelocationRule, RelocationRuleSet, Repository};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One requested dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// What to fetch
    pub coordinate: Coordinate,

    /// Expected digest (hex SHA-256/SHA-512/SHA-1 or base64 SHA-256)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// A failure of an optional dependency does not fail the request
    #[serde(default)]
    pub optional: bool,

    /// Expand this dependency's runtime dependencies from its POM
    #[serde(default)]
    pub transitive: bool,

    /// Transitive modules to leave out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<ModuleId>,

    /// Tried after the request's repositories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,

    /// Applied after the request's rules
    #[serde(default, skip_serializing_if = "RelocationRuleSet::is_empty")]
    pub relocations: RelocationRuleSet,
}

impl DependencySpec {
    /// A required, non-transitive dependency without checksum
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            checksum: None,
            optional: false,
            transitive: false,
            exclusions: Vec::new(),
            repositories: Vec::new(),
            relocations: RelocationRuleSet::empty(),
        }
    }

    /// Pin the expected digest
    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Mark the dependency optional
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Resolve transitive dependencies too
    pub fn transitive(mut self, transitive: bool) -> Self {
        self.transitive = transitive;
        self
    }

    /// Exclude a transitive module
    pub fn exclude(mut self, module: ModuleId) -> Self {
        self.exclusions.push(module);
        self
    }

    /// Add a repository for this dependency and its transitives
    pub fn repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Add a relocation rule for this dependency and its transitives
    pub fn relocate(mut self, rule: RelocationRule) -> Self {
        self.relocations.push(rule);
        self
    }

    /// `shared` followed by this dependency's own repositories
    pub fn repositories_with(&self, shared: &[Repository]) -> Vec<Repository> {
        merge_repositories(shared, &self.repositories)
    }

    /// `shared` rules followed by this dependency's own
    pub fn relocations_with(&self, shared: &RelocationRuleSet) -> RelocationRuleSet {
        shared
            .rules()
            .iter()
            .chain(self.relocations.rules())
            .cloned()
            .collect()
    }

    /// Parsed expected digest, if one was given
    pub fn expected_digest(&self) -> PlugdepsResult<Option<ExpectedDigest>> {
        self.checksum
            .as_deref()
            .map(|c| {
                ExpectedDigest::parse(c).map_err(|reason| PlugdepsError::InvalidChecksum {
                    coordinate: self.coordinate.to_string(),
                    reason,
                })
            })
            .transpose()
    }
}

/// `first` then the repositories of `second` not already listed, by URL
pub fn merge_repositories(first: &[Repository], second: &[Repository]) -> Vec<Repository> {
    let mut merged = first.to_vec();
    for repository in second {
        if !merged.iter().any(|r| r.url() == repository.url()) {
            merged.push(repository.clone());
        }
    }
    merged
}

/// A full resolution request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// Fallback order of repositories
    #[serde(default)]
    pub repositories: Vec<Repository>,

    /// Dependencies in the order their paths should be returned
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// Rules applied to every dependency (empty = no relocation)
    #[serde(default)]
    pub relocations: RelocationRuleSet,

    /// Give up waiting after this many whole seconds (downloads keep running)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Millisecond timeout; takes precedence over `timeout_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ResolveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository at the end of the fallback order
    pub fn repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Add a dependency
    pub fn dependency(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add a relocation rule
    pub fn relocate(mut self, rule: RelocationRule) -> Self {
        self.relocations.push(rule);
        self
    }

    /// Set the caller-level timeout, kept to millisecond precision
    /// (anything shorter becomes 1ms)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms = Some(millis.max(1));
        self.timeout_secs = None;
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms
            .map(Duration::from_millis)
            .or_else(|| self.timeout_secs.map(Duration::from_secs))
    }

    /// Read a request from a TOML file
    pub async fn from_file(path: &Path) -> PlugdepsResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PlugdepsError::io(format!("reading request {}", path.display()), e)
        })?;
        Self::parse(&content).map_err(|e| match e {
            PlugdepsError::Toml(reason) => PlugdepsError::ConfigInvalid {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML request
    pub fn parse(content: &str) -> PlugdepsResult<Self> {
        let request: Self = toml::from_str(content)?;
        request.validated()
    }

    /// Check every input before any I/O happens; returns the normalized request
    pub fn validated(self) -> PlugdepsResult<Self> {
        for repository in &self.repositories {
            repository.validate()?;
        }
        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for dependency in self.dependencies {
            for repository in &dependency.repositories {
                repository.validate()?;
            }
            dependency.expected_digest()?;
            let relocations = dependency.relocations.normalized()?;
            dependencies.push(DependencySpec {
                relocations,
                ..dependency
            });
        }
        if self.timeout_secs == Some(0) || self.timeout_ms == Some(0) {
            return Err(PlugdepsError::InvalidRequest(
                "timeout must be greater than zero".to_string(),
            ));
        }
        let relocations = self.relocations.normalized()?;
        Ok(Self {
            dependencies,
            relocations,
            ..self
        })
    }
}
