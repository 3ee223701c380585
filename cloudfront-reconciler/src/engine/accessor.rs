//! Versioned resource accessor: fetches the current body with its concurrency token.

use crate::error::{Operation, ReconcileError, ReconcileResult};
use crate::resources::ResourceApi;
use crate::types::{Observation, ResourceHandle, Subject, Versioned};

/// Thin wrapper over `ResourceApi::get` that keeps "not found" distinct from
/// every other failure. Never caches.
pub struct Accessor<'a, R: ResourceApi> {
    api: &'a R,
}

impl<R: ResourceApi> Clone for Accessor<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: ResourceApi> Copy for Accessor<'_, R> {}

impl<'a, R: ResourceApi> Accessor<'a, R> {
    pub fn new(api: &'a R) -> Self {
        Self { api }
    }

    pub fn subject(&self, handle: &ResourceHandle) -> Subject {
        Subject::new(self.api.lifecycle().kind, handle.clone())
    }

    /// Read the body and token. Absence is `ReconcileError::NotFound`.
    pub async fn read(&self, handle: &ResourceHandle) -> ReconcileResult<Versioned<R::Body>> {
        log::debug!("Reading {}", self.subject(handle));
        self.api
            .get(handle)
            .await
            .map_err(|e| ReconcileError::from_api(Operation::Read, self.subject(handle), e))
    }

    /// Read the body and token, mapping absence to `None`.
    pub async fn read_optional(
        &self,
        handle: &ResourceHandle,
    ) -> ReconcileResult<Option<Versioned<R::Body>>> {
        match self.read(handle).await {
            Ok(current) => Ok(Some(current)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read as a waiter observation. Only an explicit not-found becomes `Absent`.
    pub async fn observe(
        &self,
        handle: &ResourceHandle,
    ) -> ReconcileResult<Observation<Versioned<R::Body>>> {
        Ok(match self.read_optional(handle).await? {
            Some(current) => {
                let status = self.api.status(&current.body).unwrap_or_default();
                Observation::present(current, status)
            }
            None => Observation::Absent,
        })
    }
}
