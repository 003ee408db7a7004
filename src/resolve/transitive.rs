//! Transitive dependency discovery
//!
//! The resolver asks a [`TransitiveStrategy`] for the runtime dependencies of
//! each coordinate it expands. [`PomStrategy`] reads them from Maven POMs,
//! following parents and imported BOMs for versions and properties.

use crate::download::{Downloader, FetchScope};
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::{Coordinate, ModuleId, Repository};
use crate::resolve::pom::{is_excluded, pin_version, Pom, PomDependency};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// How deep parent and BOM chains are followed
const MAX_MODEL_DEPTH: usize = 10;

/// One runtime dependency of a coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitiveDependency {
    pub coordinate: Coordinate,
    /// Modules the dependency asks to leave out below it
    pub exclusions: Vec<ModuleId>,
}

/// Source of dependency edges
#[async_trait]
pub trait TransitiveStrategy: Send + Sync {
    /// Runtime dependencies of `coordinate`
    async fn dependencies(
        &self,
        coordinate: &Coordinate,
        repositories: &[Repository],
        scope: FetchScope,
    ) -> PlugdepsResult<Vec<TransitiveDependency>>;
}

/// A POM with parent and BOM contributions folded in
#[derive(Debug, Default)]
struct Model {
    properties: HashMap<String, String>,
    managed: HashMap<String, PomDependency>,
    dependencies: Vec<PomDependency>,
}

/// Reads dependencies from POMs fetched through the [`Downloader`]
pub struct PomStrategy {
    downloader: Downloader,
    models: Mutex<HashMap<Coordinate, Arc<Model>>>,
}

impl PomStrategy {
    pub fn new(downloader: Downloader) -> Self {
        Self {
            downloader,
            models: Mutex::new(HashMap::new()),
        }
    }

    async fn read_pom(
        &self,
        coordinate: &Coordinate,
        repositories: &[Repository],
        scope: FetchScope,
    ) -> PlugdepsResult<Pom> {
        let pom = coordinate.pom();
        let artifact = self
            .downloader
            .fetch(&pom, repositories, None, scope)
            .await?;
        let xml = tokio::fs::read_to_string(&artifact.path)
            .await
            .map_err(|e| PlugdepsError::cache(&artifact.path, "reading POM", e))?;
        Pom::parse(&xml).map_err(|reason| PlugdepsError::PomInvalid {
            coordinate: pom.to_string(),
            reason,
        })
    }

    fn cached_model(&self, coordinate: &Coordinate) -> Option<Arc<Model>> {
        self.models
            .lock()
            .ok()
            .and_then(|models| models.get(coordinate).cloned())
    }

    fn model<'a>(
        &'a self,
        coordinate: Coordinate,
        repositories: &'a [Repository],
        scope: FetchScope,
        depth: usize,
    ) -> BoxFuture<'a, PlugdepsResult<Arc<Model>>> {
        async move {
            if let Some(model) = self.cached_model(&coordinate) {
                return Ok(model);
            }

            let pom = self.read_pom(&coordinate, repositories, scope).await?;

            let parent = match &pom.parent {
                Some(parent) if depth < MAX_MODEL_DEPTH => {
                    let parent_coordinate =
                        Coordinate::new(&parent.group, &parent.artifact, &parent.version)?;
                    match self
                        .model(parent_coordinate.clone(), repositories, scope, depth + 1)
                        .await
                    {
                        Ok(model) => Some(model),
                        Err(e @ PlugdepsError::PomInvalid { .. }) => return Err(e),
                        Err(e) => {
                            warn!("Parent POM {} unavailable: {}", parent_coordinate, e);
                            None
                        }
                    }
                }
                _ => None,
            };

            let model = self
                .build_model(&coordinate, pom, parent.as_deref(), repositories, scope, depth)
                .await?;
            let model = Arc::new(model);
            if let Ok(mut models) = self.models.lock() {
                models.insert(coordinate, model.clone());
            }
            Ok(model)
        }
        .boxed()
    }

    async fn build_model(
        &self,
        coordinate: &Coordinate,
        pom: Pom,
        parent: Option<&Model>,
        repositories: &[Repository],
        scope: FetchScope,
        depth: usize,
    ) -> PlugdepsResult<Model> {
        let mut properties = parent.map(|p| p.properties.clone()).unwrap_or_default();
        properties.extend(pom.properties);

        let group = pom
            .group
            .or_else(|| pom.parent.as_ref().map(|p| p.group.clone()))
            .unwrap_or_else(|| coordinate.group().to_string());
        let version = pom
            .version
            .or_else(|| pom.parent.as_ref().map(|p| p.version.clone()))
            .unwrap_or_else(|| coordinate.version().to_string());
        for prefix in ["project", "pom"] {
            properties.insert(format!("{}.groupId", prefix), group.clone());
            properties.insert(format!("{}.artifactId", prefix), pom.artifact.clone());
            properties.insert(format!("{}.version", prefix), version.clone());
            if let Some(parent) = &pom.parent {
                properties.insert(format!("{}.parent.groupId", prefix), parent.group.clone());
                properties.insert(format!("{}.parent.version", prefix), parent.version.clone());
            }
        }

        let mut managed = parent.map(|p| p.managed.clone()).unwrap_or_default();
        let mut imported = Vec::new();
        for mut entry in pom.managed {
            entry.interpolate(&properties);
            if entry.scope.as_deref() == Some("import") && entry.kind.as_deref() == Some("pom") {
                imported.push(entry);
            } else {
                managed.insert(entry.management_key(), entry);
            }
        }

        for bom in imported {
            let Some(bom_coordinate) = bom
                .version
                .as_deref()
                .and_then(pin_version)
                .and_then(|v| Coordinate::new(&bom.group, &bom.artifact, v).ok())
            else {
                warn!("Skipping unresolvable BOM import {}:{}", bom.group, bom.artifact);
                continue;
            };
            if depth >= MAX_MODEL_DEPTH {
                continue;
            }
            match self
                .model(bom_coordinate.clone(), repositories, scope, depth + 1)
                .await
            {
                Ok(bom_model) => {
                    for (key, entry) in &bom_model.managed {
                        managed.entry(key.clone()).or_insert_with(|| entry.clone());
                    }
                }
                Err(e) => warn!("BOM {} unavailable: {}", bom_coordinate, e),
            }
        }

        let mut dependencies: Vec<PomDependency> = Vec::new();
        let inherited = parent.map(|p| p.dependencies.clone()).unwrap_or_default();
        for mut dependency in inherited.into_iter().chain(pom.dependencies) {
            dependency.interpolate(&properties);
            if let Some(entry) = managed.get(&dependency.management_key()) {
                dependency.apply_management(entry);
            }
            let key = dependency.management_key();
            match dependencies.iter_mut().find(|d| d.management_key() == key) {
                Some(existing) => *existing = dependency,
                None => dependencies.push(dependency),
            }
        }

        Ok(Model {
            properties,
            managed,
            dependencies,
        })
    }
}

/// Turn a POM dependency into a coordinate; `None` (with a warning) when it
/// cannot be pinned
fn to_coordinate(owner: &Coordinate, dependency: &PomDependency) -> Option<Coordinate> {
    let Some(version) = dependency.version.as_deref().and_then(pin_version) else {
        warn!(
            "{} depends on {}:{} without a usable version; skipping",
            owner, dependency.group, dependency.artifact
        );
        return None;
    };

    let (extension, classifier) = match dependency.kind.as_deref() {
        None | Some("jar") | Some("bundle") | Some("maven-plugin") => {
            ("jar", dependency.classifier.clone())
        }
        Some("test-jar") => ("jar", Some("tests".to_string())),
        Some(other) => (other, dependency.classifier.clone()),
    };

    let coordinate = Coordinate::new(&dependency.group, &dependency.artifact, version)
        .and_then(|c| c.with_extension(extension))
        .and_then(|c| match classifier {
            Some(classifier) => c.with_classifier(classifier),
            None => Ok(c),
        });
    match coordinate {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("{} declares an unusable dependency: {}", owner, e);
            None
        }
    }
}

#[async_trait]
impl TransitiveStrategy for PomStrategy {
    async fn dependencies(
        &self,
        coordinate: &Coordinate,
        repositories: &[Repository],
        scope: FetchScope,
    ) -> PlugdepsResult<Vec<TransitiveDependency>> {
        let model = self
            .model(coordinate.clone(), repositories, scope, 0)
            .await?;

        let own_module = coordinate.module();
        let dependencies = model
            .dependencies
            .iter()
            .filter(|d| d.is_runtime() && !d.optional && d.kind.as_deref() != Some("pom"))
            .filter_map(|d| to_coordinate(coordinate, d))
            .filter(|c| c.module() != own_module)
            .map(|c| {
                let exclusions = model
                    .dependencies
                    .iter()
                    .find(|d| d.group == c.group() && d.artifact == c.artifact())
                    .map(|d| d.exclusions.clone())
                    .unwrap_or_default();
                TransitiveDependency {
                    coordinate: c,
                    exclusions,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "{} has {} runtime dependencies",
            coordinate,
            dependencies.len()
        );
        Ok(dependencies)
    }
}

/// Drop dependencies matched by any exclusion
pub fn without_excluded(
    dependencies: Vec<TransitiveDependency>,
    exclusions: &[ModuleId],
) -> Vec<TransitiveDependency> {
    dependencies
        .into_iter()
        .filter(|d| !is_excluded(exclusions, &d.coordinate.module()))
        .collect()
}
