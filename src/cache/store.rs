//! On-disk artifact store
//!
//! Files only ever reach their final path through a rename from a uniquely
//! named `.part` file in the same directory, so a path that exists is always
//! complete. In-progress states live in memory; failures are persisted as
//! `.failed` markers next to where the artifact would go.

use crate::cache::entry::{CacheEntry, CacheKey, CacheState, FailureMarker, RELOCATED_DIR};
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::Coordinate;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const PARTIAL_SUFFIX: &str = ".part";
const FAILED_SUFFIX: &str = ".failed";

/// Scoped write of one cache entry.
///
/// Bytes go to a uniquely named `.part` file next to the final path.
/// [`CacheWrite::commit`] renames it into place; dropping the handle
/// without committing removes the temporary file.
pub struct CacheWrite {
    key: CacheKey,
    target: PathBuf,
    temp: PathBuf,
    file: Option<fs::File>,
    committed: bool,
}

impl CacheWrite {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Append bytes to the temporary file
    pub async fn write_all(&mut self, bytes: &[u8]) -> PlugdepsResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            PlugdepsError::Internal(format!("write to closed cache entry {}", self.key))
        })?;
        file.write_all(bytes)
            .await
            .map_err(|e| PlugdepsError::cache(&self.temp, "writing temporary file", e))
    }

    /// Flush and move the file to its final path
    pub async fn commit(mut self) -> PlugdepsResult<PathBuf> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .await
                .map_err(|e| PlugdepsError::cache(&self.temp, "syncing temporary file", e))?;
        }

        match fs::rename(&self.temp, &self.target).await {
            Ok(()) => self.committed = true,
            Err(e) => {
                if !fs::try_exists(&self.target).await.unwrap_or(false) {
                    return Err(PlugdepsError::cache(&self.target, "moving into place", e));
                }
                debug!("{} was placed concurrently", self.target.display());
            }
        }
        Ok(self.target.clone())
    }

    /// Discard the temporary file
    pub fn abort(self) {
        debug!("Aborted write of {}", self.key);
    }
}

impl Drop for CacheWrite {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Artifact cache rooted at one directory
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    states: DashMap<CacheKey, CacheState>,
    failure_ttl: Duration,
}

impl CacheStore {
    /// Store rooted at `root`; failures are never remembered
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            states: DashMap::new(),
            failure_ttl: Duration::ZERO,
        }
    }

    /// Remember failures for `ttl` (zero disables the negative cache)
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of a key
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.path_segments() {
            path.push(segment);
        }
        path
    }

    fn marker_path(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.path_for(key).into_os_string();
        path.push(FAILED_SUFFIX);
        PathBuf::from(path)
    }

    /// Current state of a key
    pub async fn lookup(&self, key: &CacheKey) -> CacheState {
        if fs::try_exists(self.path_for(key)).await.unwrap_or(false) {
            return CacheState::Ready;
        }
        if let Some(state) = self.states.get(key) {
            return *state;
        }
        if self.recent_failure(key).await.is_some() {
            return CacheState::Failed;
        }
        CacheState::Absent
    }

    /// Path of a ready artifact, if present
    pub async fn ready_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        match fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    /// Record a transient state for a running fetch
    pub fn mark(&self, key: &CacheKey, state: CacheState) {
        debug!("{} -> {}", key, state);
        self.states.insert(key.clone(), state);
    }

    /// Drop the transient state of a key
    pub fn unmark(&self, key: &CacheKey) {
        self.states.remove(key);
    }

    /// Open a scoped write for `key`
    pub async fn begin_write(&self, key: &CacheKey) -> PlugdepsResult<CacheWrite> {
        let target = self.path_for(key);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .map_err(|e| PlugdepsError::cache(&parent, "creating directory", e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(
            ".{}.{}{}",
            file_name,
            uuid::Uuid::new_v4().simple(),
            PARTIAL_SUFFIX
        ));

        let file = fs::File::create(&temp)
            .await
            .map_err(|e| PlugdepsError::cache(&temp, "creating temporary file", e))?;

        Ok(CacheWrite {
            key: key.clone(),
            target,
            temp,
            file: Some(file),
            committed: false,
        })
    }

    /// Atomically place `bytes` at the key's final path.
    ///
    /// Storing the same key twice keeps a single file; concurrent writers of
    /// identical content race harmlessly on the rename.
    pub async fn store(&self, key: &CacheKey, bytes: &[u8]) -> PlugdepsResult<PathBuf> {
        let mut write = self.begin_write(key).await?;
        write.write_all(bytes).await?;
        let path = write.commit().await?;

        self.clear_failure(key).await;
        debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(path)
    }

    /// Record that a fetch for `key` failed and drop its transient state
    pub async fn mark_failed(&self, key: &CacheKey, reason: &str) {
        self.unmark(key);
        self.record_failure(key, reason).await;
    }

    /// Persist a failure so it is not retried before the TTL expires
    async fn record_failure(&self, key: &CacheKey, reason: &str) {
        if self.failure_ttl.is_zero() {
            return;
        }
        let marker = FailureMarker {
            failed_at: Utc::now(),
            reason: reason.to_string(),
        };
        let path = self.marker_path(key);
        let result = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let json = serde_json::to_vec(&marker).map_err(std::io::Error::other)?;
            fs::write(&path, json).await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to record failure marker {}: {}", path.display(), e);
        }
    }

    /// Reason of an unexpired failure, if any
    pub async fn recent_failure(&self, key: &CacheKey) -> Option<String> {
        if self.failure_ttl.is_zero() {
            return None;
        }
        let content = fs::read(self.marker_path(key)).await.ok()?;
        let marker: FailureMarker = serde_json::from_slice(&content).ok()?;
        let age = Utc::now().signed_duration_since(marker.failed_at);
        let ttl = chrono::Duration::from_std(self.failure_ttl).ok()?;
        (age < ttl).then_some(marker.reason)
    }

    async fn clear_failure(&self, key: &CacheKey) {
        let _ = fs::remove_file(self.marker_path(key)).await;
    }

    /// Remove a coordinate in every form: original, every relocated
    /// variant, and failure markers. Returns the number of files removed.
    pub async fn invalidate(&self, coordinate: &Coordinate) -> PlugdepsResult<usize> {
        let mut targets = vec![self.path_for(&CacheKey::original(coordinate.clone()))];

        let relocated_root = self.root.join(RELOCATED_DIR);
        if let Ok(mut dirs) = fs::read_dir(&relocated_root).await {
            while let Some(dir) = dirs
                .next_entry()
                .await
                .map_err(|e| PlugdepsError::cache(&relocated_root, "listing", e))?
            {
                let hash = dir.file_name().to_string_lossy().into_owned();
                targets.push(self.path_for(&CacheKey {
                    coordinate: coordinate.clone(),
                    rules: hash,
                }));
            }
        }

        let mut removed = 0;
        for target in targets {
            let mut marker = target.clone().into_os_string();
            marker.push(FAILED_SUFFIX);
            for path in [target, PathBuf::from(marker)] {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("Removed {}", path.display());
                        removed += 1;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PlugdepsError::cache(&path, "removing", e)),
                }
            }
        }

        info!("Invalidated {} ({} files)", coordinate, removed);
        Ok(removed)
    }

    /// List every cached artifact
    pub async fn list(&self) -> PlugdepsResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for path in self.walk().await? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with('.') || name.ends_with(FAILED_SUFFIX) {
                continue;
            }

            let meta = fs::metadata(&path)
                .await
                .map_err(|e| PlugdepsError::cache(&path, "reading metadata", e))?;
            let relative: Vec<String> = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let relocation = match relative.as_slice() {
                [dir, hash, ..] if dir == RELOCATED_DIR => Some(hash.clone()),
                _ => None,
            };

            entries.push(CacheEntry {
                path: relative.join("/"),
                relocation,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Total size of every file under the root
    pub async fn total_size(&self) -> PlugdepsResult<u64> {
        Ok(self.list().await?.iter().map(|e| e.size_bytes).sum())
    }

    /// Remove everything, including stray partial files. Returns bytes freed.
    pub async fn clear(&self) -> PlugdepsResult<u64> {
        let mut freed = 0;
        for path in self.walk().await? {
            if let Ok(meta) = fs::metadata(&path).await {
                freed += meta.len();
            }
        }
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PlugdepsError::cache(&self.root, "removing cache", e)),
        }
        self.states.clear();
        info!("Cleared cache at {}", self.root.display());
        Ok(freed)
    }

    /// Every regular file below the root
    async fn walk(&self) -> PlugdepsResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(PlugdepsError::cache(&dir, "listing", e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PlugdepsError::cache(&dir, "listing", e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| PlugdepsError::cache(entry.path(), "reading file type", e))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelocationRule, RelocationRuleSet};
    use tempfile::TempDir;

    fn key(s: &str) -> CacheKey {
        CacheKey::original(s.parse().unwrap())
    }

    #[tokio::test]
    async fn store_places_file_at_coordinate_path() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("org.example:lib:1.0");

        assert_eq!(store.lookup(&k).await, CacheState::Absent);
        let path = store.store(&k, b"jar").await.unwrap();

        assert_eq!(path, dir.path().join("org/example/lib/1.0/lib-1.0.jar"));
        assert_eq!(store.lookup(&k).await, CacheState::Ready);
        assert_eq!(std::fs::read(&path).unwrap(), b"jar");
    }

    #[tokio::test]
    async fn store_leaves_no_partial_files() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("g:a:1");
        let path = store.store(&k, b"one").await.unwrap();
        store.store(&k, b"one").await.unwrap();

        let siblings: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(siblings, vec!["a-1.jar".to_string()]);
    }

    #[tokio::test]
    async fn dropped_write_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("g:a:1");

        let mut write = store.begin_write(&k).await.unwrap();
        write.write_all(b"half").await.unwrap();
        drop(write);

        let version_dir = store.path_for(&k).parent().unwrap().to_path_buf();
        assert_eq!(std::fs::read_dir(version_dir).unwrap().count(), 0);
        assert_eq!(store.lookup(&k).await, CacheState::Absent);
    }

    #[tokio::test]
    async fn aborted_write_is_not_visible() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("g:a:1");

        let mut write = store.begin_write(&k).await.unwrap();
        write.write_all(b"half").await.unwrap();
        write.abort();

        assert!(store.ready_path(&k).await.is_none());
    }

    #[tokio::test]
    async fn transient_states_are_reported() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("g:a:1");

        store.mark(&k, CacheState::InFlight);
        assert_eq!(store.lookup(&k).await, CacheState::InFlight);
        store.mark(&k, CacheState::Verifying);
        assert_eq!(store.lookup(&k).await, CacheState::Verifying);
        store.unmark(&k);
        assert_eq!(store.lookup(&k).await, CacheState::Absent);
    }

    #[tokio::test]
    async fn failures_ignored_without_ttl() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("g:a:1");

        store.mark_failed(&k, "404").await;
        assert_eq!(store.lookup(&k).await, CacheState::Absent);
    }

    #[tokio::test]
    async fn failures_remembered_with_ttl_and_cleared_by_store() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path()).with_failure_ttl(Duration::from_secs(60));
        let k = key("g:a:1");

        store.mark(&k, CacheState::InFlight);
        store.mark_failed(&k, "all mirrors 404").await;
        assert_eq!(store.lookup(&k).await, CacheState::Failed);
        assert_eq!(
            store.recent_failure(&k).await.as_deref(),
            Some("all mirrors 404")
        );

        store.store(&k, b"late").await.unwrap();
        assert_eq!(store.lookup(&k).await, CacheState::Ready);
        assert!(store.recent_failure(&k).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_every_variant() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let c: Coordinate = "g:a:1".parse().unwrap();
        let rules: RelocationRuleSet = vec![RelocationRule::new("g", "x.g").unwrap()]
            .into_iter()
            .collect();

        store.store(&CacheKey::original(c.clone()), b"o").await.unwrap();
        store
            .store(&CacheKey::relocated(c.clone(), &rules), b"r")
            .await
            .unwrap();
        store.store(&key("g:other:1"), b"keep").await.unwrap();

        assert_eq!(store.invalidate(&c).await.unwrap(), 2);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_and_clear() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let store = CacheStore::new(&root);
        let c: Coordinate = "g:a:1".parse().unwrap();
        let rules: RelocationRuleSet = vec![RelocationRule::new("g", "x.g").unwrap()]
            .into_iter()
            .collect();

        store.store(&CacheKey::original(c.clone()), b"12345").await.unwrap();
        store
            .store(&CacheKey::relocated(c, &rules), b"123")
            .await
            .unwrap();

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "g/a/1/a-1.jar");
        assert_eq!(entries[0].relocation, None);
        assert!(entries[1].path.starts_with("relocated/"));
        assert_eq!(entries[1].relocation, Some(rules.hash()));
        assert_eq!(store.total_size().await.unwrap(), 8);

        assert_eq!(store.clear().await.unwrap(), 8);
        assert!(store.list().await.unwrap().is_empty());
        assert!(!root.exists());
    }
}
