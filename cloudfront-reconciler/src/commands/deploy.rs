//! Create, update and wait-until-deployed

use crate::error::{Operation, ReconcileError, ReconcileResult};
use crate::resources::ResourceApi;
use crate::types::{Reconciled, ResourceHandle, Subject, Versioned};
use std::time::Duration;

impl<R: ResourceApi> super::service::Reconciler<R> {
    /// Create the object and, unless `wait_for_deployment` is off, wait for it to deploy.
    pub async fn create(&self, config: &R::Config) -> ReconcileResult<Reconciled<R::Body>> {
        let kind = self.api.lifecycle().kind;
        log::info!("Creating {kind}");

        let (handle, created) = self.api.create(config).await.map_err(|e| {
            ReconcileError::from_api(
                Operation::Create,
                Subject::new(kind, ResourceHandle::new("(new)")),
                e,
            )
        })?;
        log::info!("Created {}", Subject::new(kind, handle.clone()));

        if !self.settings.wait_for_deployment {
            return Ok(Reconciled::from_versioned(handle, created));
        }
        let deployed = self
            .context()
            .wait_deployed(&handle, self.settings.create_timeout)
            .await?;
        Ok(Reconciled::from_versioned(handle, deployed))
    }

    /// Replace the object's configuration with `config`.
    ///
    /// The token comes from a fresh read taken under the handle's lease, so the
    /// write only races with writers outside this process.
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        config: &R::Config,
    ) -> ReconcileResult<Reconciled<R::Body>> {
        let _lease = self.lease(handle).await?;
        let ctx = self.context();

        let current = ctx.accessor().read(handle).await?;
        let updated = ctx.mutator().update(handle, &current.etag, config).await?;
        log::info!("Updated {}", ctx.accessor().subject(handle));

        if !self.settings.wait_for_deployment {
            return Ok(Reconciled::from_versioned(handle.clone(), updated));
        }
        let deployed = ctx
            .wait_deployed(handle, self.settings.update_timeout)
            .await?;
        Ok(Reconciled::from_versioned(handle.clone(), deployed))
    }

    pub async fn wait_until_deployed(
        &self,
        handle: &ResourceHandle,
        timeout: Duration,
    ) -> ReconcileResult<Versioned<R::Body>> {
        self.context().wait_deployed(handle, Some(timeout)).await
    }
}
