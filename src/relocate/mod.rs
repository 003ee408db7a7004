//! Namespace relocation
//!
//! Rewrites a jar so every name under a rule's `from` prefix lives under its
//! `to` prefix instead. Relocated jars are cached under the rule-set hash and
//! produced at most once per (coordinate, rule set), however many callers
//! ask at the same time.

pub mod class_file;
pub mod jar;
pub mod remap;

pub use remap::Remapper;

use crate::audit::{events, AuditLog};
use crate::cache::{CacheKey, CacheStore};
use crate::download::SingleFlight;
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::{Coordinate, RelocationRuleSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces relocated copies of cached artifacts
#[derive(Clone)]
pub struct Relocator {
    cache: Arc<CacheStore>,
    flights: Arc<SingleFlight<CacheKey, PathBuf>>,
    audit: AuditLog,
}

impl Relocator {
    pub fn new(cache: Arc<CacheStore>, audit: AuditLog) -> Self {
        Self {
            cache,
            flights: SingleFlight::new(),
            audit,
        }
    }

    /// Path of `source` relocated with `rules`.
    ///
    /// An empty rule set returns `source` itself. Artifacts that are not
    /// jars have no class names to rewrite and are passed through too.
    pub async fn relocate(
        &self,
        source: &Path,
        coordinate: &Coordinate,
        rules: &RelocationRuleSet,
    ) -> PlugdepsResult<PathBuf> {
        if rules.is_empty() {
            return Ok(source.to_path_buf());
        }
        if coordinate.extension() != "jar" {
            debug!("Not relocating non-jar {}", coordinate);
            return Ok(source.to_path_buf());
        }

        let key = CacheKey::relocated(coordinate.clone(), rules);
        if let Some(path) = self.cache.ready_path(&key).await {
            debug!("Relocated {} already cached", key);
            return Ok(path);
        }

        let worker = self.clone();
        let job_key = key.clone();
        let source = source.to_path_buf();
        let rules = rules.clone();
        let (flight, _) = self.flights.join_or_start(key, move || async move {
            worker.transform(job_key, source, rules).await
        });

        flight.await
    }

    async fn transform(
        self,
        key: CacheKey,
        source: PathBuf,
        rules: RelocationRuleSet,
    ) -> PlugdepsResult<PathBuf> {
        if let Some(path) = self.cache.ready_path(&key).await {
            return Ok(path);
        }

        let input = tokio::fs::read(&source)
            .await
            .map_err(|e| PlugdepsError::cache(&source, "reading artifact to relocate", e))?;

        let label = source.clone();
        let output = tokio::task::spawn_blocking(move || {
            let remapper = Remapper::new(&rules);
            jar::relocate_jar(&input, &remapper)
        })
        .await
        .map_err(|e| PlugdepsError::Internal(format!("relocation task failed: {}", e)))?
        .map_err(|reason| PlugdepsError::relocation(&label, reason))?;

        let path = self.cache.store(&key, &output).await?;
        info!("Relocated {} -> {}", key.coordinate, path.display());

        self.audit
            .log(
                events::RELOCATED,
                &serde_json::json!({
                    "coordinate": key.coordinate.to_string(),
                    "rules": key.rules,
                    "source": source.display().to_string(),
                    "output": path.display().to_string(),
                }),
            )
            .await;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::RelocationRule;
    use tempfile::TempDir;

    fn rules() -> RelocationRuleSet {
        vec![RelocationRule::new("org.apache.commons", "my.libs.commons").unwrap()]
            .into_iter()
            .collect()
    }

    async fn setup(bytes: &[u8]) -> (TempDir, Relocator, PathBuf, Coordinate) {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path()));
        let coordinate: Coordinate = "org.apache.commons:commons-lang3:3.14.0".parse().unwrap();
        let source = cache
            .store(&CacheKey::original(coordinate.clone()), bytes)
            .await
            .unwrap();
        let relocator = Relocator::new(cache, AuditLog::disabled());
        (dir, relocator, source, coordinate)
    }

    #[tokio::test]
    async fn empty_rules_pass_through() {
        let (_dir, relocator, source, coordinate) = setup(b"anything").await;
        let path = relocator
            .relocate(&source, &coordinate, &RelocationRuleSet::empty())
            .await
            .unwrap();
        assert_eq!(path, source);
    }

    #[tokio::test]
    async fn relocated_copy_is_stored_separately_and_reused() {
        let (dir, relocator, source, coordinate) = setup(&jar::tests::sample_jar()).await;
        let rules = rules();

        let first = relocator.relocate(&source, &coordinate, &rules).await.unwrap();
        let second = relocator.relocate(&source, &coordinate, &rules).await.unwrap();

        assert_ne!(first, source);
        assert_eq!(first, second);
        assert!(first.starts_with(dir.path().join("relocated").join(rules.hash())));
        assert_eq!(
            std::fs::read(&source).unwrap(),
            jar::tests::sample_jar(),
            "source must stay untouched"
        );
    }

    #[tokio::test]
    async fn relocation_is_deterministic_across_caches() {
        let (_a, relocator_a, source_a, coordinate) = setup(&jar::tests::sample_jar()).await;
        let (_b, relocator_b, source_b, _) = setup(&jar::tests::sample_jar()).await;

        let a = relocator_a.relocate(&source_a, &coordinate, &rules()).await.unwrap();
        let b = relocator_b.relocate(&source_b, &coordinate, &rules()).await.unwrap();

        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[tokio::test]
    async fn concurrent_relocations_share_one_transform() {
        let (_dir, relocator, source, coordinate) = setup(&jar::tests::sample_jar()).await;
        let rules = rules();

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let relocator = relocator.clone();
            let source = source.clone();
            let coordinate = coordinate.clone();
            let rules = rules.clone();
            tasks.push(tokio::spawn(async move {
                relocator.relocate(&source, &coordinate, &rules).await
            }));
        }

        let mut paths = Vec::new();
        for task in tasks {
            paths.push(task.await.unwrap().unwrap());
        }
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn malformed_jar_is_fatal() {
        let (_dir, relocator, source, coordinate) = setup(b"not a jar").await;
        let err = relocator
            .relocate(&source, &coordinate, &rules())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Relocation);
    }
}
