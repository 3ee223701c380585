//! CloudFront reconciler service layer
//!
//! `Reconciler` owns one resource client together with the settings, retry
//! table, lease map and cancellation token every operation runs under. The
//! operations themselves live next to this file: create, update and
//! wait-until-deployed in `deploy.rs`, delete in `delete.rs`, and the managed
//! certificate workflow in `certificate.rs`.

use crate::config::Settings;
use crate::engine::lock::{Lease, LeaseKey, LeaseMap};
use crate::engine::retry::RetryTable;
use crate::engine::EngineContext;
use crate::error::ReconcileResult;
use crate::resources::ResourceApi;
use crate::types::ResourceHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives one CloudFront object kind to its desired state.
pub struct Reconciler<R: ResourceApi> {
    pub(crate) api: R,
    pub(crate) settings: Settings,
    pub(crate) retry: RetryTable,
    pub(crate) locks: Arc<LeaseMap>,
    pub(crate) cancel: CancellationToken,
}

impl<R: ResourceApi> Reconciler<R> {
    /// Create a reconciler for `api`.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::InvalidConfig` if `settings` fail validation.
    pub fn new(api: R, settings: Settings) -> ReconcileResult<Self> {
        settings.validate()?;
        let retry = RetryTable::from_settings(&settings);
        Ok(Self {
            api,
            settings,
            retry,
            locks: LeaseMap::global(),
            cancel: CancellationToken::new(),
        })
    }

    /// Observe `cancel` in every wait and retry pause.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use `locks` instead of the process-wide lease map.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<LeaseMap>) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn with_retry_table(mut self, retry: RetryTable) -> Self {
        self.retry = retry;
        self
    }

    pub fn api(&self) -> &R {
        &self.api
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn context(&self) -> EngineContext<'_, R> {
        EngineContext {
            api: &self.api,
            settings: &self.settings,
            retry: &self.retry,
            cancel: &self.cancel,
        }
    }

    /// Take the handle's lease for kinds whose writes must not interleave.
    pub(crate) async fn lease(&self, handle: &ResourceHandle) -> ReconcileResult<Option<Lease>> {
        let lifecycle = self.api.lifecycle();
        if !lifecycle.serialize_writes {
            return Ok(None);
        }
        let key = LeaseKey::new(lifecycle.kind, handle.clone());
        self.locks.acquire(key, &self.cancel).await.map(Some)
    }
}
