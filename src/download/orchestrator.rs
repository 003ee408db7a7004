//! Download orchestration
//!
//! For one coordinate: cache first, then every eligible repository in order.
//! Concurrent requests for the same coordinate share one download, and a
//! semaphore bounds how many downloads touch the network at once.

use crate::audit::{events, AuditLog};
use crate::cache::{CacheKey, CacheState, CacheStore};
use crate::config::schema::DownloadConfig;
use crate::download::retry::RetryConfig;
use crate::download::single_flight::SingleFlight;
use crate::download::Transport;
use crate::error::{AttemptFailure, PlugdepsError, PlugdepsResult};
use crate::integrity::{DigestAlgorithm, ExpectedDigest, Verifier};
use crate::model::{Coordinate, Repository, ResolvedArtifact};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Whether a coordinate was requested directly or pulled in transitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchScope {
    Direct,
    Transitive,
}

/// Tunables of a [`Downloader`]
#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    pub max_concurrent: usize,
    pub attempt_timeout: Duration,
    pub retry: RetryConfig,
}

impl DownloaderOptions {
    pub fn from_settings(settings: &DownloadConfig) -> Self {
        Self {
            max_concurrent: settings.max_concurrent.max(1),
            attempt_timeout: Duration::from_secs(settings.attempt_timeout_secs.max(1)),
            retry: RetryConfig::from_settings(settings),
        }
    }
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self::from_settings(&DownloadConfig::default())
    }
}

/// Fetches coordinates into the cache, one network download per key
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    verifier: Verifier,
    cache: Arc<CacheStore>,
    flights: Arc<SingleFlight<CacheKey, ResolvedArtifact>>,
    permits: Arc<Semaphore>,
    options: DownloaderOptions,
    audit: AuditLog,
}

impl Downloader {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
        audit: AuditLog,
        options: DownloaderOptions,
    ) -> Self {
        Self {
            verifier: Verifier::new(transport.clone(), audit.clone()),
            transport,
            cache,
            flights: SingleFlight::new(),
            permits: Arc::new(Semaphore::new(options.max_concurrent.max(1))),
            options,
            audit,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Make `coordinate` available locally.
    ///
    /// A ready cache entry is returned without touching the network. Otherwise
    /// the caller joins the running download for this coordinate or starts
    /// one. The download keeps running if the caller stops waiting.
    pub async fn fetch(
        &self,
        coordinate: &Coordinate,
        repositories: &[Repository],
        expected: Option<&ExpectedDigest>,
        scope: FetchScope,
    ) -> PlugdepsResult<ResolvedArtifact> {
        let key = CacheKey::original(coordinate.clone());

        if let Some(path) = self.cache.ready_path(&key).await {
            debug!("Cache hit for {}", coordinate);
            return Ok(ResolvedArtifact::cached(coordinate.clone(), path));
        }
        if self.cache.recent_failure(&key).await.is_some() {
            return Err(PlugdepsError::RecentlyFailed {
                coordinate: coordinate.to_string(),
            });
        }

        let worker = self.clone();
        let job_key = key.clone();
        let repositories = repositories.to_vec();
        let expected = expected.cloned();

        let (flight, leader) = self.flights.join_or_start(key, move || async move {
            worker
                .download(job_key, repositories, expected, scope)
                .await
        });
        if !leader {
            debug!("Joining in-flight download of {}", coordinate);
        }

        flight.await
    }

    /// Body of the single-flight task
    async fn download(
        self,
        key: CacheKey,
        repositories: Vec<Repository>,
        expected: Option<ExpectedDigest>,
        scope: FetchScope,
    ) -> PlugdepsResult<ResolvedArtifact> {
        // A previous leader may have finished between the caller's cache check
        // and this task starting.
        if let Some(path) = self.cache.ready_path(&key).await {
            return Ok(ResolvedArtifact::cached(key.coordinate.clone(), path));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PlugdepsError::Internal("download pool closed".to_string()))?;

        self.cache.mark(&key, CacheState::InFlight);
        let result = self
            .try_repositories(&key, &repositories, expected.as_ref(), scope)
            .await;

        match &result {
            Ok(_) => self.cache.unmark(&key),
            Err(e) => self.cache.mark_failed(&key, &e.to_string()).await,
        }
        result
    }

    async fn try_repositories(
        &self,
        key: &CacheKey,
        repositories: &[Repository],
        expected: Option<&ExpectedDigest>,
        scope: FetchScope,
    ) -> PlugdepsResult<ResolvedArtifact> {
        let coordinate = &key.coordinate;
        let mut failures = Vec::new();
        let mut attempts = 0u32;

        for repository in repositories {
            if scope == FetchScope::Transitive && repository.is_direct_only() {
                debug!("Skipping direct-only {} for {}", repository, coordinate);
                continue;
            }

            let url = repository.artifact_url(coordinate);
            let bytes = match self.fetch_with_retry(&url, repository, &mut attempts).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("{} not served by {}: {}", coordinate, repository, e);
                    failures.push(AttemptFailure {
                        repository: repository.url().to_string(),
                        reason: e.to_string(),
                        integrity: false,
                    });
                    continue;
                }
            };

            self.cache.mark(key, CacheState::Verifying);
            let verified = match self
                .verifier
                .verify(coordinate, repository, bytes, expected)
                .await
            {
                Ok(verified) => verified,
                Err(e) => {
                    failures.push(AttemptFailure {
                        repository: repository.url().to_string(),
                        reason: e.to_string(),
                        integrity: true,
                    });
                    self.cache.mark(key, CacheState::InFlight);
                    continue;
                }
            };

            let sha256 = ExpectedDigest::compute(DigestAlgorithm::Sha256, &verified.bytes).to_hex();
            let path = self.cache.store(key, &verified.bytes).await?;
            info!("Downloaded {} from {}", coordinate, repository);

            self.audit
                .log(
                    events::DOWNLOADED,
                    &serde_json::json!({
                        "coordinate": coordinate.to_string(),
                        "repository": repository.url(),
                        "sha256": sha256,
                        "verification": verified.verification.to_string(),
                    }),
                )
                .await;

            return Ok(ResolvedArtifact {
                coordinate: coordinate.clone(),
                repository: Some(repository.url().to_string()),
                sha256: Some(sha256),
                verification: Some(verified.verification),
                path,
                relocated: false,
                from_cache: false,
            });
        }

        let last = failures
            .last()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no repository is eligible for this coordinate".to_string());
        warn!("Giving up on {} after {} attempt(s)", coordinate, attempts);

        Err(PlugdepsError::DownloadFailed {
            coordinate: coordinate.to_string(),
            attempts,
            last,
            failures,
        })
    }

    /// One repository: retry transient failures with backoff
    async fn fetch_with_retry(
        &self,
        url: &str,
        repository: &Repository,
        attempts: &mut u32,
    ) -> PlugdepsResult<Vec<u8>> {
        let retry = self.options.retry;
        let mut retries = 0;

        loop {
            *attempts += 1;
            let result = match tokio::time::timeout(
                self.options.attempt_timeout,
                self.transport.get(url, repository.credentials()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(PlugdepsError::AttemptTimeout {
                    url: url.to_string(),
                }),
            };

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retries < retry.max_retries => {
                    retries += 1;
                    let delay = retry.backoff_delay(retries);
                    warn!(
                        "{} (retry {}/{} in {:?})",
                        e, retries, retry.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::transport::testing::FakeTransport;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn options() -> DownloaderOptions {
        DownloaderOptions {
            max_concurrent: 4,
            attempt_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                base_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            },
        }
    }

    fn downloader(dir: &TempDir, transport: Arc<FakeTransport>) -> Downloader {
        Downloader::new(
            transport,
            Arc::new(CacheStore::new(dir.path())),
            AuditLog::disabled(),
            options(),
        )
    }

    fn repos(urls: &[&str]) -> Vec<Repository> {
        urls.iter().map(|u| Repository::new(*u).unwrap()).collect()
    }

    fn coordinate() -> Coordinate {
        "g:a:1.0.0".parse().unwrap()
    }

    #[tokio::test]
    async fn falls_back_to_second_mirror_after_404() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.serve("http://mirror2/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        transport.serve(
            "http://mirror2/g/a/1.0.0/a-1.0.0.jar.sha256",
            HELLO_SHA256.as_bytes().to_vec(),
        );
        let downloader = downloader(&dir, transport.clone());

        let artifact = downloader
            .fetch(
                &coordinate(),
                &repos(&["http://mirror1", "http://mirror2"]),
                None,
                FetchScope::Direct,
            )
            .await
            .unwrap();

        assert_eq!(artifact.repository.as_deref(), Some("http://mirror2/"));
        assert_eq!(transport.hits("http://mirror1/g/a/1.0.0/a-1.0.0.jar"), 1);
        assert_eq!(transport.hits("http://mirror2/g/a/1.0.0/a-1.0.0.jar"), 1);
        assert_eq!(
            std::fs::read(dir.path().join("g/a/1.0.0/a-1.0.0.jar")).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn first_repository_wins_when_both_serve() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.serve("http://one/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        transport.serve("http://two/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        let downloader = downloader(&dir, transport.clone());

        let artifact = downloader
            .fetch(&coordinate(), &repos(&["http://one", "http://two"]), None, FetchScope::Direct)
            .await
            .unwrap();

        assert_eq!(artifact.repository.as_deref(), Some("http://one/"));
        assert_eq!(transport.hits("http://two/g/a/1.0.0/a-1.0.0.jar"), 0);
    }

    #[tokio::test]
    async fn cache_hit_makes_no_request() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.serve("http://one/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        let downloader = downloader(&dir, transport.clone());
        let repositories = repos(&["http://one"]);

        let first = downloader
            .fetch(&coordinate(), &repositories, None, FetchScope::Direct)
            .await
            .unwrap();
        let requests = transport.total_requests();

        let second = downloader
            .fetch(&coordinate(), &repositories, None, FetchScope::Direct)
            .await
            .unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.path, second.path);
        assert_eq!(transport.total_requests(), requests);
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_download() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::with_delay(Duration::from_millis(50)));
        transport.serve("http://one/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        let downloader = downloader(&dir, transport.clone());
        let repositories = repos(&["http://one"]);

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let downloader = downloader.clone();
            let repositories = repositories.clone();
            tasks.push(tokio::spawn(async move {
                downloader
                    .fetch(&coordinate(), &repositories, None, FetchScope::Direct)
                    .await
            }));
        }

        let mut paths = Vec::new();
        for task in tasks {
            paths.push(task.await.unwrap().unwrap().path);
        }

        assert_eq!(transport.hits("http://one/g/a/1.0.0/a-1.0.0.jar"), 1);
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn mismatch_moves_on_and_is_integrity_tagged() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.serve("http://evil/g/a/1.0.0/a-1.0.0.jar", b"tampered".to_vec());
        transport.serve("http://good/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        let downloader = downloader(&dir, transport.clone());
        let expected = ExpectedDigest::parse(HELLO_SHA256).unwrap();

        let artifact = downloader
            .fetch(
                &coordinate(),
                &repos(&["http://evil", "http://good"]),
                Some(&expected),
                FetchScope::Direct,
            )
            .await
            .unwrap();
        assert_eq!(artifact.repository.as_deref(), Some("http://good/"));

        let dir = TempDir::new().unwrap();
        let downloader = self::downloader(&dir, transport);
        let err = downloader
            .fetch(
                &coordinate(),
                &repos(&["http://evil"]),
                Some(&expected),
                FetchScope::Direct,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(!dir.path().join("g/a/1.0.0/a-1.0.0.jar").exists());
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error_and_attempts() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let downloader = downloader(&dir, transport);

        let err = downloader
            .fetch(
                &coordinate(),
                &repos(&["http://mirror1", "http://mirror2"]),
                None,
                FetchScope::Direct,
            )
            .await
            .unwrap_err();

        match err {
            PlugdepsError::DownloadFailed {
                attempts,
                last,
                failures,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(failures.len(), 2);
                assert!(last.contains("mirror2"));
                assert!(last.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.fail("http://flaky/g/a/1.0.0/a-1.0.0.jar", 503);
        let downloader = downloader(&dir, transport.clone());

        let err = downloader
            .fetch(&coordinate(), &repos(&["http://flaky"]), None, FetchScope::Direct)
            .await
            .unwrap_err();

        // one attempt plus two retries
        assert_eq!(transport.hits("http://flaky/g/a/1.0.0/a-1.0.0.jar"), 3);
        assert_eq!(err.kind(), ErrorKind::Download);
    }

    #[tokio::test]
    async fn direct_only_repositories_skipped_for_transitives() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.serve("http://private/g/a/1.0.0/a-1.0.0.jar", b"hello".to_vec());
        let downloader = downloader(&dir, transport.clone());
        let repositories = vec![Repository::new("http://private").unwrap().direct_only(true)];

        let err = downloader
            .fetch(&coordinate(), &repositories, None, FetchScope::Transitive)
            .await
            .unwrap_err();
        assert!(matches!(err, PlugdepsError::DownloadFailed { attempts: 0, .. }));
        assert_eq!(transport.total_requests(), 0);

        downloader
            .fetch(&coordinate(), &repositories, None, FetchScope::Direct)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failures_remembered_when_ttl_set() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let downloader = Downloader::new(
            transport.clone(),
            Arc::new(CacheStore::new(dir.path()).with_failure_ttl(Duration::from_secs(60))),
            AuditLog::disabled(),
            options(),
        );
        let repositories = repos(&["http://mirror1"]);

        downloader
            .fetch(&coordinate(), &repositories, None, FetchScope::Direct)
            .await
            .unwrap_err();
        let err = downloader
            .fetch(&coordinate(), &repositories, None, FetchScope::Direct)
            .await
            .unwrap_err();

        assert!(matches!(err, PlugdepsError::RecentlyFailed { .. }));
        assert_eq!(transport.hits("http://mirror1/g/a/1.0.0/a-1.0.0.jar"), 1);
    }
}
