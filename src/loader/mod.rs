//! Request-scoped batch loading
//!
//! [`BatchLoader`] coalesces lookups issued within a short window into one
//! batched fetch against a [`BatchFetcher`], deduplicates keys, fans the
//! per-key outcome out to every waiting caller, and memoizes resolved
//! values for the lifetime of the loader. One loader is built per request;
//! its cache never outlives the request that owns it.
//!
//! Rust's scheduler is preemptive, so "keys issued in the same tick" is
//! realized as an explicit coalescing window: a batch dispatches when its
//! window timer elapses or it reaches the configured size cap, whichever
//! comes first.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Result;

mod author;

pub use author::{AuthorFetcher, AuthorLoader, AuthorSummary};

/// Per-key outcome of a batched load
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The batched fetch completed but returned no entry for this key
    #[error("no record for key")]
    NotFound,
    /// The batched fetch itself could not execute
    #[error("batched fetch failed: {0}")]
    Transport(String),
}

/// Collaborator performing the actual batched fetch.
///
/// Results are addressed by key, not by position: the returned map may omit
/// keys (a per-key failure for their callers) and may be in any order.
#[async_trait]
pub trait BatchFetcher: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    async fn fetch(&self, keys: &[Self::Key]) -> Result<HashMap<Self::Key, Self::Value>>;
}

/// Batch loader tuning
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// How long a batch stays open collecting keys before dispatch
    pub window: Duration,
    /// Unique-key cap; a batch this large dispatches immediately
    pub max_batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(2),
            max_batch_size: 64,
        }
    }
}

type Waiters<K, V> = HashMap<K, Vec<oneshot::Sender<std::result::Result<V, LoadError>>>>;

struct OpenBatch<K, V> {
    id: u64,
    /// Unique keys in first-seen order
    keys: Vec<K>,
    waiters: Waiters<K, V>,
}

impl<K, V> OpenBatch<K, V> {
    fn new(id: u64) -> Self {
        Self {
            id,
            keys: Vec::new(),
            waiters: HashMap::new(),
        }
    }
}

struct LoaderState<K, V> {
    cache: HashMap<K, V>,
    open: Option<OpenBatch<K, V>>,
    next_batch_id: u64,
}

impl<K, V> LoaderState<K, V> {
    fn new() -> Self {
        Self {
            cache: HashMap::new(),
            open: None,
            next_batch_id: 0,
        }
    }
}

/// Coalescing, deduplicating, memoizing loader over a [`BatchFetcher`]
pub struct BatchLoader<F: BatchFetcher> {
    fetcher: Arc<F>,
    config: LoaderConfig,
    state: Arc<Mutex<LoaderState<F::Key, F::Value>>>,
}

impl<F: BatchFetcher> Clone for BatchLoader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            config: self.config,
            state: Arc::clone(&self.state),
        }
    }
}

impl<F: BatchFetcher> BatchLoader<F> {
    pub fn new(fetcher: Arc<F>, config: LoaderConfig) -> Self {
        Self {
            fetcher,
            config,
            state: Arc::new(Mutex::new(LoaderState::new())),
        }
    }

    /// Load one value by key.
    ///
    /// Resolved values are served from the loader cache without touching a
    /// batch. Otherwise the key joins the open batch (opening one if
    /// needed); duplicate keys in one batch share a single fetch slot and
    /// every caller receives a clone of the same resolved value.
    pub async fn load(&self, key: F::Key) -> std::result::Result<F::Value, LoadError> {
        let (rx, opened_batch, full_batch) = {
            let mut state = self.state.lock();

            if let Some(value) = state.cache.get(&key) {
                return Ok(value.clone());
            }

            let mut opened_batch = None;
            if state.open.is_none() {
                let id = state.next_batch_id;
                state.next_batch_id += 1;
                state.open = Some(OpenBatch::new(id));
                opened_batch = Some(id);
            }

            let (tx, rx) = oneshot::channel();
            let mut full = false;
            if let Some(batch) = state.open.as_mut() {
                match batch.waiters.entry(key.clone()) {
                    Entry::Occupied(mut entry) => entry.get_mut().push(tx),
                    Entry::Vacant(entry) => {
                        entry.insert(vec![tx]);
                        batch.keys.push(key.clone());
                    }
                }
                full = batch.keys.len() >= self.config.max_batch_size;
            }

            let full_batch = if full { state.open.take() } else { None };
            (rx, opened_batch, full_batch)
        };

        // A freshly opened batch gets a dispatch timer. If the batch fills
        // up and dispatches early, the timer finds a different (or no) open
        // batch and does nothing.
        if let Some(batch_id) = opened_batch {
            let loader = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(loader.config.window).await;
                loader.dispatch(batch_id).await;
            });
        }

        // Size-capped batches dispatch on a task of their own so that a
        // caller going away cannot cancel work shared with other callers.
        if let Some(batch) = full_batch {
            let loader = self.clone();
            tokio::spawn(async move {
                loader.run_batch(batch).await;
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            // The batch task dropped the sender without resolving; treat it
            // like an unreachable collaborator.
            Err(_) => Err(LoadError::Transport("batch abandoned".to_string())),
        }
    }

    /// Dispatch the open batch if it is still the one the timer was set for.
    async fn dispatch(&self, batch_id: u64) {
        let batch = {
            let mut state = self.state.lock();
            let matches = matches!(&state.open, Some(open) if open.id == batch_id);
            if matches {
                state.open.take()
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            self.run_batch(batch).await;
        }
    }

    async fn run_batch(&self, batch: OpenBatch<F::Key, F::Value>) {
        let OpenBatch {
            id,
            keys,
            mut waiters,
        } = batch;
        debug!(batch = id, keys = keys.len(), "dispatching batched fetch");

        match self.fetcher.fetch(&keys).await {
            Ok(mut results) => {
                let mut state = self.state.lock();
                for key in &keys {
                    let outcome = match results.remove(key) {
                        Some(value) => {
                            state.cache.insert(key.clone(), value.clone());
                            Ok(value)
                        }
                        None => Err(LoadError::NotFound),
                    };
                    if let Some(senders) = waiters.remove(key) {
                        for tx in senders {
                            // A caller that went away is not an error for
                            // the rest of the batch.
                            let _ = tx.send(outcome.clone());
                        }
                    }
                }
            }
            Err(err) => {
                let detail = err.to_string();
                debug!(batch = id, error = %detail, "batched fetch failed");
                for (_, senders) in waiters.drain() {
                    for tx in senders {
                        let _ = tx.send(Err(LoadError::Transport(detail.clone())));
                    }
                }
            }
        }
    }
}
