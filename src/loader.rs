//! Handing resolved artifacts to a host
//!
//! What "loading" means belongs to the host (a class loader, a module
//! layer, a launcher command line). The host implements [`LoaderBridge`];
//! plugdeps only calls it with final paths, in resolution order.

use crate::error::{PlugdepsError, PlugdepsResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Final artifact paths plus the host's target, passed through untouched
#[derive(Debug)]
pub struct LoadRequest<'a, T: ?Sized> {
    pub paths: Vec<PathBuf>,
    pub target: &'a T,
}

impl<'a, T: ?Sized> LoadRequest<'a, T> {
    pub fn new(paths: Vec<PathBuf>, target: &'a T) -> Self {
        Self { paths, target }
    }
}

/// Host-side injection of artifacts into a target
pub trait LoaderBridge: Send + Sync {
    /// Whatever the host loads into
    type Target: ?Sized;

    /// Make one artifact visible to `target`
    fn inject(&self, path: &Path, target: &Self::Target) -> PlugdepsResult<()>;

    /// Inject every path in order, stopping at the first failure.
    /// Returns how many paths were injected.
    fn load(&self, request: &LoadRequest<'_, Self::Target>) -> PlugdepsResult<usize> {
        for path in &request.paths {
            self.inject(path, request.target)?;
        }
        Ok(request.paths.len())
    }
}

/// An ordered, duplicate-free classpath
#[derive(Debug, Default)]
pub struct Classpath {
    entries: Mutex<Vec<PathBuf>>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries joined with the platform path separator
    pub fn to_argument(&self) -> PlugdepsResult<String> {
        let joined: OsString = std::env::join_paths(self.entries()).map_err(|e| {
            PlugdepsError::Load {
                path: PathBuf::new(),
                reason: e.to_string(),
            }
        })?;
        Ok(joined.to_string_lossy().into_owned())
    }

    /// Write a `java @argfile` carrying `-cp <entries>`
    pub async fn write_argfile(&self, path: &Path) -> PlugdepsResult<()> {
        let classpath = self.to_argument()?;
        let quoted = classpath.replace('\\', "\\\\").replace('"', "\\\"");
        let content = format!("-cp\n\"{}\"\n", quoted);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PlugdepsError::io(format!("creating {}", parent.display()), e))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| PlugdepsError::io(format!("writing {}", path.display()), e))
    }
}

/// Loads artifacts by appending them to a [`Classpath`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ClasspathLoader;

impl LoaderBridge for ClasspathLoader {
    type Target = Classpath;

    fn inject(&self, path: &Path, target: &Classpath) -> PlugdepsResult<()> {
        if !path.is_file() {
            return Err(PlugdepsError::Load {
                path: path.to_path_buf(),
                reason: "not a readable file".to_string(),
            });
        }

        let mut entries = target.entries.lock().map_err(|_| PlugdepsError::Load {
            path: path.to_path_buf(),
            reason: "classpath lock poisoned".to_string(),
        })?;
        if !entries.iter().any(|e| e == path) {
            entries.push(path.to_path_buf());
        }
        Ok(())
    }
}
