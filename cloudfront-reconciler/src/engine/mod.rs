//! Reconciliation engine: the accessor, mutator and waiter primitives, plus
//! the retry table and lease map they consult.

pub mod accessor;
pub mod lock;
pub mod mutator;
pub mod retry;
pub mod waiter;

use crate::config::Settings;
use crate::error::{ReconcileError, ReconcileResult};
use crate::resources::ResourceApi;
use crate::types::{ResourceHandle, Versioned};
use accessor::Accessor;
use mutator::Mutator;
use retry::RetryTable;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use waiter::{wait_for_state, Absence, WaitSpec};

/// Everything one top-level operation needs, borrowed from its `Reconciler`.
pub struct EngineContext<'a, R: ResourceApi> {
    pub api: &'a R,
    pub settings: &'a Settings,
    pub retry: &'a RetryTable,
    pub cancel: &'a CancellationToken,
}

impl<R: ResourceApi> Clone for EngineContext<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: ResourceApi> Copy for EngineContext<'_, R> {}

impl<'a, R: ResourceApi> EngineContext<'a, R> {
    pub fn accessor(&self) -> Accessor<'a, R> {
        Accessor::new(self.api)
    }

    pub fn mutator(&self) -> Mutator<'a, R> {
        Mutator::new(self.api, self.retry, self.cancel)
    }

    /// Wait for the object to reach its deployed state and return the final read.
    ///
    /// Kinds without a deploy status converge synchronously, so this is a plain read.
    pub async fn wait_deployed(
        &self,
        handle: &ResourceHandle,
        timeout: Option<Duration>,
    ) -> ReconcileResult<Versioned<R::Body>> {
        let lifecycle = self.api.lifecycle();
        let accessor = self.accessor();
        let Some(deploy) = &lifecycle.deploy else {
            return accessor.read(handle).await;
        };

        let spec = WaitSpec::new(
            accessor.subject(handle),
            timeout.unwrap_or(lifecycle.deploy_timeout),
        )
        .pending(deploy.pending)
        .target(deploy.target)
        .failure(deploy.failure)
        .delay(lifecycle.deploy_delay)
        .poll(lifecycle.poll)
        .consecutive_targets(lifecycle.min_target_observations)
        .progress_every(self.settings.progress_interval)
        .on_absent(Absence::Tolerate(self.settings.not_found_checks));

        match wait_for_state(&spec, self.cancel, move || async move {
            accessor.observe(handle).await
        })
        .await?
        {
            Some(current) => Ok(current),
            None => Err(ReconcileError::NotFound {
                subject: spec.subject().clone(),
            }),
        }
    }

    /// Wait until reads report the object gone.
    pub async fn wait_deleted(
        &self,
        handle: &ResourceHandle,
        timeout: Option<Duration>,
    ) -> ReconcileResult<()> {
        let lifecycle = self.api.lifecycle();
        let Some(deploy) = &lifecycle.deploy else {
            return Ok(());
        };
        let accessor = self.accessor();

        let spec = WaitSpec::new(
            accessor.subject(handle),
            timeout.unwrap_or(lifecycle.deploy_timeout),
        )
        .pending(&deploy.deleting())
        .delay(lifecycle.delete_delay)
        .poll(lifecycle.poll)
        .progress_every(self.settings.progress_interval);

        wait_for_state(&spec, self.cancel, move || async move {
            accessor.observe(handle).await
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::catalog::STATUS_DEPLOYED;
    use crate::test_utils::{Call, FakeApi};
    use crate::types::ResourceKind;

    fn defaults() -> (Settings, RetryTable, CancellationToken) {
        (
            Settings::default(),
            RetryTable::default(),
            CancellationToken::new(),
        )
    }

    fn context<'a>(
        api: &'a FakeApi,
        settings: &'a Settings,
        retry: &'a RetryTable,
        cancel: &'a CancellationToken,
    ) -> EngineContext<'a, FakeApi> {
        EngineContext {
            api,
            settings,
            retry,
            cancel,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_deployed_requires_two_reads_for_tenants() {
        let api = FakeApi::new(ResourceKind::DistributionTenant);
        let handle = api.seed_deployed("dt_2abc", true);
        api.script_statuses(&handle, &["InProgress", "Deployed", "Deployed"]);
        let (settings, retry, cancel) = defaults();

        let current = context(&api, &settings, &retry, &cancel)
            .wait_deployed(&handle, None)
            .await
            .unwrap();

        assert_eq!(current.body.status.as_deref(), Some(STATUS_DEPLOYED));
        assert_eq!(api.count(|c| matches!(c, Call::Get { .. })), 3);
    }

    #[tokio::test]
    async fn test_wait_deployed_without_deploy_status_is_one_read() {
        let api = FakeApi::new(ResourceKind::OriginAccessControl);
        let handle = api.seed_deployed("E3OAC", false);
        let (settings, retry, cancel) = defaults();

        context(&api, &settings, &retry, &cancel)
            .wait_deployed(&handle, None)
            .await
            .unwrap();

        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_deleted_polls_through_lingering_reads() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        api.set_linger_reads(3);
        api.remove(&handle);
        let (settings, retry, cancel) = defaults();

        context(&api, &settings, &retry, &cancel)
            .wait_deleted(&handle, None)
            .await
            .unwrap();

        assert_eq!(api.count(|c| matches!(c, Call::Get { status: Some(_), .. })), 3);
        assert_eq!(api.count(|c| matches!(c, Call::Get { status: None, .. })), 1);
    }
}
