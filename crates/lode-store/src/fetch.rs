//! On-demand retrieval of promised objects.
//!
//! A [`FetchSession`] owns a small multi-threaded tokio runtime. Callers queue
//! ids with [`FetchSession::begin_fetch`] while they keep doing other work;
//! full batches are dispatched to the [`ObjectSource`] immediately and the
//! remainder goes out when [`FetchSession::await_all`] is called. Everything
//! fetched is verified against its id and written into the local store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lode_types::ObjectId;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Somewhere promised objects can be retrieved from (the promisor remote).
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch the given objects. Ids the source does not hold are omitted
    /// from the result rather than reported as errors.
    async fn fetch_objects(&self, ids: &[ObjectId]) -> StoreResult<Vec<StoredObject>>;
}

/// An [`ObjectSource`] backed by another object store, such as the full
/// repository a partial clone was made from.
pub struct StoreSource {
    store: Arc<dyn ObjectStore>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ObjectSource for StoreSource {
    async fn fetch_objects(&self, ids: &[ObjectId]) -> StoreResult<Vec<StoredObject>> {
        let store = Arc::clone(&self.store);
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut found = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(obj) = store.read(id)? {
                    found.push(obj);
                }
            }
            Ok(found)
        })
        .await
        .map_err(|e| StoreError::Fetch(e.to_string()))?
    }
}

/// Tuning for a [`FetchSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ids per request sent to the source.
    pub batch_size: usize,
    /// Worker threads in the session runtime.
    pub worker_threads: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            worker_threads: 2,
        }
    }
}

/// A batch of fetch requests that completes in one place.
pub struct FetchSession {
    runtime: Runtime,
    source: Arc<dyn ObjectSource>,
    local: Arc<dyn ObjectStore>,
    options: FetchOptions,
    pending: Vec<ObjectId>,
    requested: HashSet<ObjectId>,
    in_flight: Vec<JoinHandle<StoreResult<Vec<StoredObject>>>>,
}

impl FetchSession {
    /// Start a session that fetches from `source` into `local`.
    pub fn open(
        source: Arc<dyn ObjectSource>,
        local: Arc<dyn ObjectStore>,
        options: FetchOptions,
    ) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.worker_threads.max(1))
            .thread_name("lode-fetch")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            source,
            local,
            options: FetchOptions {
                batch_size: options.batch_size.max(1),
                ..options
            },
            pending: Vec::new(),
            requested: HashSet::new(),
            in_flight: Vec::new(),
        })
    }

    /// Queue ids for fetching. Ids already requested in this session are
    /// ignored. Returns how many new ids were queued.
    pub fn begin_fetch(&mut self, ids: impl IntoIterator<Item = ObjectId>) -> usize {
        let mut queued = 0;
        for id in ids {
            if self.requested.insert(id) {
                self.pending.push(id);
                queued += 1;
            }
        }
        while self.pending.len() >= self.options.batch_size {
            let rest = self.pending.split_off(self.options.batch_size);
            let batch = std::mem::replace(&mut self.pending, rest);
            self.dispatch(batch);
        }
        queued
    }

    /// Number of ids requested so far in this session.
    pub fn requested_count(&self) -> usize {
        self.requested.len()
    }

    fn dispatch(&mut self, batch: Vec<ObjectId>) {
        tracing::debug!(count = batch.len(), "dispatching fetch batch");
        let source = Arc::clone(&self.source);
        let handle = self
            .runtime
            .spawn(async move { source.fetch_objects(&batch).await });
        self.in_flight.push(handle);
    }

    /// Send any partial batch, wait for every outstanding request, and write
    /// the results into the local store. Returns the number of objects
    /// written.
    ///
    /// Fails if the source returned an object nobody asked for, or failed to
    /// return one that was asked for.
    pub fn await_all(&mut self) -> StoreResult<usize> {
        if !self.pending.is_empty() {
            let batch = std::mem::take(&mut self.pending);
            self.dispatch(batch);
        }
        let handles = std::mem::take(&mut self.in_flight);
        let results = self.runtime.block_on(async move {
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await);
            }
            results
        });

        let mut written = 0;
        for result in results {
            let objects = result.map_err(|e| StoreError::Fetch(e.to_string()))??;
            for obj in objects {
                let id = obj.compute_id();
                if !self.requested.contains(&id) {
                    return Err(StoreError::Fetch(format!("unrequested object {id}")));
                }
                self.local.write(&obj)?;
                written += 1;
            }
        }

        let missing = self
            .requested
            .iter()
            .filter(|id| !matches!(self.local.exists(id), Ok(true)))
            .count();
        if missing > 0 {
            return Err(StoreError::Fetch(format!(
                "remote did not supply {missing} requested object(s)"
            )));
        }
        tracing::debug!(written, "fetch session complete");
        Ok(written)
    }
}

impl Drop for FetchSession {
    /// Requests still in flight are joined and their results discarded.
    fn drop(&mut self) {
        let handles = std::mem::take(&mut self.in_flight);
        if handles.is_empty() {
            return;
        }
        tracing::debug!(count = handles.len(), "joining abandoned fetch batches");
        self.runtime.block_on(async move {
            for handle in handles {
                let _ = handle.await;
            }
        });
    }
}

impl std::fmt::Debug for FetchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSession")
            .field("options", &self.options)
            .field("pending", &self.pending.len())
            .field("requested", &self.requested.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
