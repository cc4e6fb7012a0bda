// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test doubles for code built on a [`StorageManager`](crate::StorageManager).
//!
//! Alongside the [`MockBackend`] tier, [`DeferredSpawner`] queues detached work such as cache
//! write-backs so a test can observe the state before and after it runs.

use std::{fmt::Debug, pin::Pin, sync::Arc};

use anyspawn::Spawner;
use parking_lot::Mutex;

#[doc(inline)]
pub use tierstore_tier::testing::{BackendOp, MockBackend};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A spawner that holds spawned tasks until [`run_pending`](Self::run_pending) is awaited.
///
/// Clones share the same queue.
///
/// # Examples
///
/// ```
/// use tierstore::testing::DeferredSpawner;
/// # futures::executor::block_on(async {
///
/// let deferred = DeferredSpawner::new();
/// drop(deferred.spawner().spawn(async {}));
/// assert_eq!(deferred.pending(), 1);
///
/// assert_eq!(deferred.run_pending().await, 1);
/// assert_eq!(deferred.pending(), 0);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct DeferredSpawner {
    queue: Arc<Mutex<Vec<Task>>>,
}

impl DeferredSpawner {
    /// Creates a spawner with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a [`Spawner`] that pushes onto this queue.
    #[must_use]
    pub fn spawner(&self) -> Spawner {
        let queue = Arc::clone(&self.queue);
        Spawner::new_custom("deferred", move |task| queue.lock().push(task))
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs every queued task to completion, in spawn order, and returns how many ran.
    ///
    /// Tasks spawned while these run stay queued for the next call.
    pub async fn run_pending(&self) -> usize {
        let tasks = std::mem::take(&mut *self.queue.lock());
        let count = tasks.len();
        for task in tasks {
            task.await;
        }
        count
    }
}

impl Debug for DeferredSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSpawner").field("pending", &self.pending()).finish()
    }
}
