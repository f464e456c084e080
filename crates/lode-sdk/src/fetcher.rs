//! Making deltas ready for output.
//!
//! A delta is ready when both of its values can be read locally. The
//! promissory fetcher sets aside deltas that reference promised blobs,
//! starts fetching those blobs, and hands the deltas back once everything
//! has arrived. The strict fetcher treats a promised blob as corruption.

use std::sync::Arc;

use lode_diff::Delta;
use lode_store::{FetchOptions, FetchSession, ObjectSource, ObjectStore, StoreError};
use lode_types::{ItemKey, ObjectId};
use tracing::{debug, info};

use crate::error::{SdkError, SdkResult};
use crate::kinds::FetchPolicy;
use crate::sink::MessageSink;

/// Makes item deltas ready to output, according to the dataset's
/// [`FetchPolicy`].
pub enum DeltaFetcher {
    Promissory(PromissoryFetcher),
    Strict(StrictFetcher),
}

impl DeltaFetcher {
    /// `true` when the delta can be output now. `false` when it has been
    /// set aside until [`DeltaFetcher::finish_fetching`].
    pub fn ensure_ready_or_start_fetch(&mut self, key: &ItemKey, delta: &Delta) -> SdkResult<bool> {
        match self {
            DeltaFetcher::Promissory(f) => f.ensure_ready_or_start_fetch(key, delta),
            DeltaFetcher::Strict(f) => f.ensure_ready(delta).map(|()| true),
        }
    }

    /// Wait for every fetch started so far and return the deltas that were
    /// set aside, in the order they were first seen.
    pub fn finish_fetching(&mut self) -> SdkResult<Vec<(ItemKey, Delta)>> {
        match self {
            DeltaFetcher::Promissory(f) => f.finish_fetching(),
            DeltaFetcher::Strict(_) => Ok(Vec::new()),
        }
    }

    /// The policy this fetcher implements.
    pub fn policy(&self) -> FetchPolicy {
        match self {
            DeltaFetcher::Promissory(_) => FetchPolicy::Promissory,
            DeltaFetcher::Strict(_) => FetchPolicy::Strict,
        }
    }
}

/// Fetches promised blobs of one dataset from the remote.
pub struct PromissoryFetcher {
    ds_path: String,
    local: Arc<dyn ObjectStore>,
    remote: Option<Arc<dyn ObjectSource>>,
    options: FetchOptions,
    sink: MessageSink,
    session: Option<FetchSession>,
    buffered: Vec<(ItemKey, Delta)>,
}

impl PromissoryFetcher {
    /// Without a `remote`, a promised blob surfaces as not found once
    /// fetching finishes.
    pub fn new(
        ds_path: impl Into<String>,
        local: Arc<dyn ObjectStore>,
        remote: Option<Arc<dyn ObjectSource>>,
        options: FetchOptions,
        sink: MessageSink,
    ) -> Self {
        Self {
            ds_path: ds_path.into(),
            local,
            remote,
            options,
            sink,
            session: None,
            buffered: Vec::new(),
        }
    }

    fn ensure_ready_or_start_fetch(&mut self, key: &ItemKey, delta: &Delta) -> SdkResult<bool> {
        let mut missing = Vec::new();
        for value in [delta.old(), delta.new_value()].into_iter().flatten() {
            if !value.is_ready()? {
                missing.push(value.content_id());
            }
        }
        if missing.is_empty() {
            return Ok(true);
        }
        let session = self.session(missing[0])?;
        session.begin_fetch(missing);
        self.buffered.push((key.clone(), delta.clone()));
        Ok(false)
    }

    /// The fetch session, opened on first use.
    fn session(&mut self, first_missing: ObjectId) -> SdkResult<&mut FetchSession> {
        if self.session.is_none() {
            let Some(remote) = &self.remote else {
                return Err(StoreError::NotFound(first_missing).into());
            };
            debug!(ds_path = %self.ds_path, "opening fetch session");
            self.session = Some(FetchSession::open(
                Arc::clone(remote),
                Arc::clone(&self.local),
                self.options,
            )?);
        }
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => Err(SdkError::InvalidOperation("fetch session unavailable".into())),
        }
    }

    fn finish_fetching(&mut self) -> SdkResult<Vec<(ItemKey, Delta)>> {
        let Some(mut session) = self.session.take() else {
            return Ok(std::mem::take(&mut self.buffered));
        };
        self.sink
            .line(&format!("Fetching missing but required features in {}", self.ds_path));
        info!(
            ds_path = %self.ds_path,
            blobs = session.requested_count(),
            deltas = self.buffered.len(),
            "fetching promised blobs"
        );
        session.await_all()?;
        Ok(std::mem::take(&mut self.buffered))
    }
}

/// For datasets whose blobs are never promised.
pub struct StrictFetcher {
    ds_path: String,
    dataset_type: String,
}

impl StrictFetcher {
    pub fn new(ds_path: impl Into<String>, dataset_type: impl Into<String>) -> Self {
        Self {
            ds_path: ds_path.into(),
            dataset_type: dataset_type.into(),
        }
    }

    fn ensure_ready(&self, delta: &Delta) -> SdkResult<()> {
        for value in [delta.old(), delta.new_value()].into_iter().flatten() {
            if !value.is_ready()? {
                return Err(SdkError::PromisedBlobInStrictDataset {
                    ds_path: self.ds_path.clone(),
                    dataset_type: self.dataset_type.clone(),
                });
            }
        }
        Ok(())
    }
}
