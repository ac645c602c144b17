//! # Logincenter Session
//!
//! Local session state for logincenter: the platform and account profiles, the credential
//! cookies sent with every request, and the key-value persistence they are mirrored to.

use async_trait::async_trait;
use logincenter_core::AuthError;

pub mod cookie;
pub mod manager;
pub mod store;

pub use cookie::CookieJar;
pub use manager::SessionManager;
#[cfg(feature = "store-file")]
pub use store::FileStore;
pub use store::MemoryStore;

/// Persistent key-value storage offered by the host.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError>;
    /// Store `value` under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), AuthError>;
    /// Delete `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// Write `value`, retrying once. A second failure is logged and dropped.
pub(crate) async fn write_best_effort(store: &dyn KeyValueStore, key: &str, value: Vec<u8>) {
    if let Err(first) = store.set(key, value.clone()).await {
        log::warn!("[session] write of {key} failed, retrying: {first}");
        if let Err(second) = store.set(key, value).await {
            log::warn!("[session] write of {key} failed again, keeping memory only: {second}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Fails the first `failures` writes.
    struct FlakyStore {
        failures: AtomicUsize,
        writes: AtomicUsize,
        value: Mutex<Option<Vec<u8>>>,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                writes: AtomicUsize::new(0),
                value: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, AuthError> {
            Ok(self.value.lock().await.clone())
        }

        async fn set(&self, _key: &str, value: Vec<u8>) -> Result<(), AuthError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(AuthError::Storage("disk full".into()));
            }
            *self.value.lock().await = Some(value);
            Ok(())
        }

        async fn remove(&self, _key: &str) -> Result<(), AuthError> {
            *self.value.lock().await = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn write_is_retried_once() {
        let store = FlakyStore::new(1);
        write_best_effort(&store, "k", b"v".to_vec()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn write_gives_up_after_second_failure() {
        let store = FlakyStore::new(5);
        write_best_effort(&store, "k", b"v".to_vec()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
