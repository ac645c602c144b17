//! Collapses concurrent invocations of the same logical operation.
//!
//! [`CallDeduplicator::dedupe`] runs an operation at most once per key at any given time.
//! Callers arriving while an execution is in flight await that execution and receive a clone
//! of its output. Nothing is cached: the pending record is dropped as soon as the execution
//! settles, so the next call with the same key starts over.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Output of a pending execution as seen by every waiter. A panic is carried as its message
/// so the shared future always completes normally.
type Settled<T> = Result<T, String>;

type PendingFuture<T> = Shared<BoxFuture<'static, Settled<T>>>;

struct Pending {
    id: u64,
    future: Box<dyn Any + Send>,
}

#[derive(Default)]
struct Inner {
    pending: Mutex<HashMap<String, Pending>>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the pending record once the execution it belongs to settles or is dropped.
struct PendingGuard {
    inner: Arc<Inner>,
    key: String,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.inner.lock();
        // A newer execution may already own the key.
        if pending.get(&self.key).is_some_and(|p| p.id == self.id) {
            pending.remove(&self.key);
        }
    }
}

/// Keyed in-flight call deduplication.
///
/// Cloning is cheap and clones share the same pending table.
#[derive(Clone, Default)]
pub struct CallDeduplicator {
    inner: Arc<Inner>,
}

impl CallDeduplicator {
    /// Create an empty deduplicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` unless an execution for `key` is already in flight, in which case
    /// wait for that one and return a clone of its output.
    ///
    /// If the operation panics (while being built or while running) the pending record is
    /// cleared and the panic is resumed in every waiting caller.
    pub async fn dedupe<T, F, Fut>(&self, key: &str, operation: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard {
            inner: self.inner.clone(),
            key: key.to_owned(),
            id,
        };
        let future: PendingFuture<T> = async move {
            let _guard = guard;
            AssertUnwindSafe(async move { operation().await })
                .catch_unwind()
                .await
                .map_err(|payload| panic_message(payload.as_ref()))
        }
        .boxed()
        .shared();

        let existing = {
            let mut pending = self.inner.lock();
            match pending.get(key) {
                Some(other) => {
                    let joined = other.future.downcast_ref::<PendingFuture<T>>().cloned();
                    match joined {
                        Some(_) => log::debug!("joining in-flight call `{key}`"),
                        None => log::warn!(
                            "in-flight call `{key}` has a different output type, running undeduplicated"
                        ),
                    }
                    joined
                }
                None => {
                    pending.insert(
                        key.to_owned(),
                        Pending {
                            id,
                            future: Box::new(future.clone()),
                        },
                    );
                    None
                }
            }
        };

        let future = match existing {
            Some(joined) => {
                drop(future);
                joined
            }
            None => future,
        };
        settle(future.await)
    }

    /// Whether an execution for `key` is currently in flight.
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Number of executions currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().len()
    }
}

fn settle<T>(settled: Settled<T>) -> T {
    match settled {
        Ok(value) => value,
        Err(message) => std::panic::resume_unwind(Box::new(message)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}

impl std::fmt::Debug for CallDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDeduplicator")
            .field("pending", &self.pending_len())
            .finish()
    }
}
