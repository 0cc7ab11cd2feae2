//! Deduplicates concurrent productions of the same output name.
//!
//! The first caller for a key drives the work to completion; every other
//! caller that arrives while it is in flight shares the same outcome
//! instead of starting a redundant production. Artifact readers never go
//! through this — they check the blob store first and only fall back to
//! single-flight on a cache miss.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

type Outcome<V> = Option<Result<V, Arc<String>>>;

#[derive(Clone)]
pub struct SingleFlight<V> {
    inflight: Arc<Mutex<HashMap<String, watch::Receiver<Outcome<V>>>>>,
}

impl<V: Clone + Send + Sync + 'static> SingleFlight<V> {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `make` for `key` if nothing is already in flight, or awaits
    /// the in-flight run's outcome otherwise. A caller whose own future is
    /// dropped (cancelled) simply stops awaiting here — it does not
    /// cancel the winner's work, which keeps running for any other
    /// waiter. The winner's production itself runs on a detached task, so
    /// slot cleanup always completes even if the winning caller is the
    /// one who gets cancelled.
    pub async fn call<F, Fut>(&self, key: &str, make: F) -> Result<V, Arc<String>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<V, String>> + Send + 'static,
    {
        let mut rx = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(key) {
                existing.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.to_owned(), rx.clone());
                drop(inflight);
                let driver = self.clone();
                let key_owned = key.to_owned();
                tokio::spawn(async move {
                    driver.drive(key_owned, make, tx).await;
                });
                rx
            }
        };

        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(Arc::new("single-flight producer dropped".to_owned()));
            }
        }
    }

    async fn drive<F, Fut>(
        &self,
        key: String,
        make: F,
        tx: watch::Sender<Outcome<V>>,
    ) where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, String>>,
    {
        let outcome = make().await.map_err(Arc::new);
        // Free the slot before publishing so a caller who wakes on the
        // change and immediately re-enters `call` for the same key
        // starts a fresh run rather than rejoining a freed one.
        self.inflight.lock().await.remove(&key);
        let _ = tx.send(Some(outcome));
    }
}

impl<V: Clone + Send + Sync + 'static> Default for SingleFlight<V> {
    fn default() -> Self {
        Self::new()
    }
}
