//! Delete logic for the reconciler

use crate::error::ReconcileResult;
use crate::resources::ResourceApi;
use crate::types::ResourceHandle;
use crate::workflows;

impl<R: ResourceApi> super::service::Reconciler<R> {
    /// Disable, delete and wait for the object to disappear.
    /// Deleting a handle that no longer exists succeeds.
    pub async fn delete(&self, handle: &ResourceHandle) -> ReconcileResult<()> {
        let _lease = self.lease(handle).await?;
        workflows::delete::run(&self.context(), handle).await
    }
}
