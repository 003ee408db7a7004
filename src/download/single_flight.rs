//! Per-key request coalescing
//!
//! The first caller for a key spawns the work as a detached task; every
//! caller (the first included) awaits a shared handle to its result. The
//! task removes its own entry when done, so the next caller after that
//! starts fresh. Dropping a handle never cancels the task.

use crate::error::{PlugdepsError, PlugdepsResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Shared handle to a running task's result
pub type Flight<T> = Shared<BoxFuture<'static, PlugdepsResult<T>>>;

/// Map of in-flight tasks keyed by `K`
pub struct SingleFlight<K, T>
where
    K: Eq + Hash,
{
    inflight: DashMap<K, Flight<T>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inflight: DashMap::new(),
        })
    }

    /// Join the task for `key`, or start it with `work` if none is running.
    ///
    /// Returns the shared handle and whether this call started the task.
    pub fn join_or_start<F, Fut>(self: &Arc<Self>, key: K, work: F) -> (Flight<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PlugdepsResult<T>> + Send + 'static,
    {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let this = Arc::clone(self);
                let task = work();
                let handle = tokio::spawn(async move {
                    let result = task.await;
                    this.inflight.remove(&key);
                    result
                });

                let flight = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(PlugdepsError::Internal(format!("background task failed: {}", e)))
                    })
                }
                .boxed()
                .shared();

                entry.insert(flight.clone());
                (flight, true)
            }
        }
    }

    /// Number of keys with a running task
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}
