//! Deferred per-session tasks
//!
//! One pending task per key. Scheduling again replaces (aborts) the previous
//! task. The task body must re-check its own precondition when it fires.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Clone, Default)]
pub struct CleanupScheduler {
    tasks: Arc<DashMap<String, (u64, AbortHandle)>>,
    next_generation: Arc<AtomicU64>,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing anything pending under `key`
    pub fn schedule<F>(&self, key: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tasks = self.tasks.clone();
        let owned_key = key.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
            tasks.remove_if(&owned_key, |_, (g, _)| *g == generation);
        });

        if let Some((_, (_, previous))) = self.tasks.remove(key) {
            previous.abort();
        }
        self.tasks
            .insert(key.to_string(), (generation, handle.abort_handle()));
    }

    /// Abort the pending task for `key`. Returns true if one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match self.tasks.remove(key) {
            Some((_, (_, handle))) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.tasks
            .get(key)
            .map(|entry| !entry.value().1.is_finished())
            .unwrap_or(false)
    }
}
