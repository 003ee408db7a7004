//! Resolution facade
//!
//! Turns a [`ResolveRequest`] into local paths:
//!
//! 1. expand transitive dependencies into a [`DependencyGraph`]
//! 2. mediate versions (a pure function of graph and policy)
//! 3. fetch every selected coordinate, in parallel up to the download limit
//! 4. relocate with the request's rules
//!
//! Paths come back in request order, each dependency followed by what it
//! pulled in. A failing required dependency fails the request with every
//! failure listed; a failing optional one is recorded as skipped.

pub mod graph;
pub mod pom;
pub mod transitive;

pub use graph::{compare_versions, DependencyGraph, MediationPolicy, Selection};
pub use transitive::{PomStrategy, TransitiveDependency, TransitiveStrategy};

use crate::audit::AuditLog;
use crate::cache::CacheStore;
use crate::config::schema::Config;
use crate::config::ConfigManager;
use crate::download::{Downloader, DownloaderOptions, FetchScope, HttpTransport, Transport};
use crate::error::{DependencyFailure, ErrorKind, PlugdepsError, PlugdepsResult};
use crate::integrity::ExpectedDigest;
use crate::loader::{LoadRequest, LoaderBridge};
use crate::model::{
    merge_repositories, Coordinate, ModuleId, RelocationRuleSet, Repository, ResolveRequest,
    ResolvedArtifact,
};
use crate::relocate::Relocator;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A dependency left out of the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDependency {
    pub coordinate: Coordinate,
    pub kind: String,
    pub reason: String,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Available artifacts in load order
    pub artifacts: Vec<ResolvedArtifact>,
    /// Optional dependencies that could not be made available
    pub skipped: Vec<SkippedDependency>,
}

impl Resolution {
    /// Final paths in load order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}

/// Resolver tunables
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub downloader: DownloaderOptions,
    pub mediation: MediationPolicy,
    /// Transitive levels below a requested dependency
    pub max_depth: usize,
    /// Used when a request names no repositories
    pub repositories: Vec<Repository>,
}

impl ResolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            downloader: DownloaderOptions::from_settings(&config.download),
            mediation: config.resolve.mediation,
            max_depth: config.resolve.max_depth,
            repositories: config.repositories.default.clone(),
        }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Entry point for resolving and loading dependencies
#[derive(Clone)]
pub struct Resolver {
    downloader: Downloader,
    relocator: Relocator,
    strategy: Arc<dyn TransitiveStrategy>,
    options: ResolverOptions,
}

impl Resolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
        audit: AuditLog,
        options: ResolverOptions,
    ) -> Self {
        let downloader = Downloader::new(
            transport,
            cache.clone(),
            audit.clone(),
            options.downloader.clone(),
        );
        Self {
            strategy: Arc::new(PomStrategy::new(downloader.clone())),
            relocator: Relocator::new(cache, audit),
            downloader,
            options,
        }
    }

    /// Resolver over HTTP with the configured cache and audit log
    pub fn from_config(config: &Config) -> Self {
        let cache = CacheStore::new(ConfigManager::cache_dir(config))
            .with_failure_ttl(Duration::from_secs(config.cache.failure_ttl_secs));
        Self::new(
            Arc::new(HttpTransport::new(&config.download)),
            Arc::new(cache),
            AuditLog::new(config),
            ResolverOptions::from_config(config),
        )
    }

    /// Replace how transitive dependencies are discovered
    pub fn with_strategy(mut self, strategy: Arc<dyn TransitiveStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.downloader.cache()
    }

    /// Resolve a request.
    ///
    /// The request is validated before any I/O. When the request carries a
    /// timeout and it expires, this returns [`PlugdepsError::Timeout`]; the
    /// downloads already started run to completion and land in the cache.
    pub async fn resolve(&self, request: &ResolveRequest) -> PlugdepsResult<Resolution> {
        let request = request.clone().validated()?;

        match request.timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, self.resolve_validated(&request))
                .await
                .map_err(|_| {
                    warn!("Resolution gave up after {:?}; downloads continue", limit);
                    PlugdepsError::Timeout(limit)
                })?,
            None => self.resolve_validated(&request).await,
        }
    }

    /// Resolve, then hand every path to `bridge` in order
    pub async fn load<B: LoaderBridge>(
        &self,
        request: &ResolveRequest,
        bridge: &B,
        target: &B::Target,
    ) -> PlugdepsResult<Resolution> {
        let resolution = self.resolve(request).await?;
        let loaded = bridge.load(&LoadRequest::new(resolution.paths(), target))?;
        info!("Loaded {} artifact(s)", loaded);
        Ok(resolution)
    }

    async fn resolve_validated(&self, request: &ResolveRequest) -> PlugdepsResult<Resolution> {
        if request.dependencies.is_empty() {
            return Ok(Resolution::default());
        }

        let shared = if request.repositories.is_empty() {
            &self.options.repositories
        } else {
            &request.repositories
        };
        // Repositories and rules of each requested dependency, by request index
        let mut contexts = Vec::with_capacity(request.dependencies.len());
        for dependency in &request.dependencies {
            let repositories = dependency.repositories_with(shared);
            if repositories.is_empty() {
                return Err(PlugdepsError::InvalidRequest(format!(
                    "no repositories configured for {}",
                    dependency.coordinate
                )));
            }
            contexts.push((repositories, dependency.relocations_with(&request.relocations)));
        }

        let mut digests: HashMap<Coordinate, ExpectedDigest> = HashMap::new();
        for dependency in &request.dependencies {
            if let Some(digest) = dependency.expected_digest()? {
                digests.entry(dependency.coordinate.clone()).or_insert(digest);
            }
        }

        let (graph, mut expansion_errors) = self.expand(request, &contexts).await?;
        let selections = graph.mediate(self.options.mediation)?;
        debug!(
            "{} coordinate(s) in graph, {} selected",
            graph.len(),
            selections.len()
        );

        let root_index: HashMap<&Coordinate, usize> = request
            .dependencies
            .iter()
            .enumerate()
            .rev()
            .map(|(i, d)| (&d.coordinate, i))
            .collect();

        // A selection takes its rules from the dependency that requested it,
        // or else from the first one that pulled it in; any reaching
        // dependency's repositories may serve it.
        let targets: Vec<(Vec<Repository>, &RelocationRuleSet)> = selections
            .iter()
            .map(|selection| {
                let owner = root_index
                    .get(&selection.coordinate)
                    .copied()
                    .or_else(|| selection.roots.first().copied())
                    .unwrap_or_default();
                let repositories = selection
                    .roots
                    .iter()
                    .fold(contexts[owner].0.clone(), |merged, &r| {
                        merge_repositories(&merged, &contexts[r].0)
                    });
                (repositories, &contexts[owner].1)
            })
            .collect();

        let results = join_all(selections.iter().zip(&targets).map(
            |(selection, (repositories, rules))| {
                let scope = if selection.depth == 0 {
                    FetchScope::Direct
                } else {
                    FetchScope::Transitive
                };
                self.materialize(
                    &selection.coordinate,
                    digests.get(&selection.coordinate),
                    scope,
                    repositories,
                    rules,
                )
            },
        ))
        .await;

        // A requested dependency fails if it could not be expanded or fetched
        let mut outcomes = Vec::with_capacity(selections.len());
        let mut failed_roots = HashSet::new();
        for (selection, result) in selections.iter().zip(results) {
            let root = root_index.get(&selection.coordinate).copied();
            let result = match root.and_then(|i| expansion_errors.remove(&i)) {
                Some(error) => Err(error),
                None => result,
            };
            if let (Some(i), Err(_)) = (root, &result) {
                failed_roots.insert(i);
            }
            outcomes.push((selection, root, result));
        }

        let mut resolution = Resolution::default();
        let mut failures = Vec::new();
        for (selection, root, result) in outcomes {
            let required = selection
                .roots
                .iter()
                .any(|&r| !request.dependencies[r].optional);

            if root.is_none() && selection.roots.iter().all(|r| failed_roots.contains(r)) {
                if !required {
                    let parent = &request.dependencies[selection.roots[0]].coordinate;
                    resolution.skipped.push(SkippedDependency {
                        coordinate: selection.coordinate.clone(),
                        kind: ErrorKind::Resolution.to_string(),
                        reason: format!("pulled in by skipped {}", parent),
                    });
                }
                continue;
            }

            match result {
                Ok(artifact) => resolution.artifacts.push(artifact),
                Err(error) if required => {
                    warn!("Required dependency {} failed: {}", selection.coordinate, error);
                    failures.push(DependencyFailure {
                        coordinate: selection.coordinate.to_string(),
                        error,
                    });
                }
                Err(error) => {
                    warn!("Skipping optional {}: {}", selection.coordinate, error);
                    resolution.skipped.push(SkippedDependency {
                        coordinate: selection.coordinate.clone(),
                        kind: error.kind().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(PlugdepsError::Aggregate(failures));
        }

        info!(
            "Resolved {} artifact(s), skipped {}",
            resolution.artifacts.len(),
            resolution.skipped.len()
        );
        Ok(resolution)
    }

    /// Build the dependency graph, one breadth-first level at a time per
    /// requested dependency, looking POMs up in that dependency's
    /// repositories. Expansion errors that are not download failures are
    /// attributed to the requested dependency they occurred under.
    async fn expand(
        &self,
        request: &ResolveRequest,
        contexts: &[(Vec<Repository>, RelocationRuleSet)],
    ) -> PlugdepsResult<(DependencyGraph, HashMap<usize, PlugdepsError>)> {
        let mut graph = DependencyGraph::new();
        let mut errors = HashMap::new();

        for dependency in &request.dependencies {
            graph.add_root(dependency.coordinate.clone());
        }

        for (index, dependency) in request.dependencies.iter().enumerate() {
            if !dependency.transitive {
                continue;
            }
            let repositories = &contexts[index].0;

            let mut seen = HashSet::from([dependency.coordinate.clone()]);
            let mut level: Vec<(Coordinate, Vec<ModuleId>)> =
                vec![(dependency.coordinate.clone(), dependency.exclusions.clone())];

            for depth in 0..self.options.max_depth {
                if level.is_empty() {
                    break;
                }
                let scope = if depth == 0 {
                    FetchScope::Direct
                } else {
                    FetchScope::Transitive
                };

                let found = join_all(level.iter().map(|(coordinate, _)| {
                    self.strategy.dependencies(coordinate, repositories, scope)
                }))
                .await;

                let mut next = Vec::new();
                for ((coordinate, exclusions), children) in level.into_iter().zip(found) {
                    let children = match children {
                        Ok(children) => children,
                        Err(e) if matches!(e.kind(), ErrorKind::Download | ErrorKind::Integrity) => {
                            warn!("No usable POM for {}, not expanding it: {}", coordinate, e);
                            continue;
                        }
                        Err(e) => {
                            errors.entry(index).or_insert(e);
                            continue;
                        }
                    };

                    for child in transitive::without_excluded(children, &exclusions) {
                        graph.add_edge(&coordinate, child.coordinate.clone())?;
                        if seen.insert(child.coordinate.clone()) {
                            let mut inherited = exclusions.clone();
                            inherited.extend(child.exclusions);
                            next.push((child.coordinate, inherited));
                        }
                    }
                }
                level = next;
            }

            if !level.is_empty() {
                debug!(
                    "Stopped expanding {} at depth {}",
                    dependency.coordinate, self.options.max_depth
                );
            }
        }

        Ok((graph, errors))
    }

    async fn materialize(
        &self,
        coordinate: &Coordinate,
        expected: Option<&ExpectedDigest>,
        scope: FetchScope,
        repositories: &[Repository],
        rules: &RelocationRuleSet,
    ) -> PlugdepsResult<ResolvedArtifact> {
        let artifact = self
            .downloader
            .fetch(coordinate, repositories, expected, scope)
            .await?;
        let path = self
            .relocator
            .relocate(&artifact.path, coordinate, rules)
            .await?;
        if path == artifact.path {
            Ok(artifact)
        } else {
            Ok(artifact.into_relocated(path))
        }
    }
}
