//! Managed certificate reconciliation for tenants

use crate::error::ReconcileResult;
use crate::resources::{CertificateBinding, ManagedCertificateRequest};
use crate::types::{Reconciled, ResourceHandle};
use crate::workflows;

impl<R: CertificateBinding> super::service::Reconciler<R> {
    /// Wait for the tenant to deploy, then bring its bound certificate in line
    /// with the managed certificate issued for `request`.
    pub async fn reconcile_certificate(
        &self,
        handle: &ResourceHandle,
        request: Option<&ManagedCertificateRequest>,
    ) -> ReconcileResult<Reconciled<R::Body>> {
        let _lease = self.lease(handle).await?;
        let current = workflows::certificate::run(
            &self.context(),
            handle,
            request,
            self.settings.update_timeout,
        )
        .await?;
        Ok(Reconciled::from_versioned(handle.clone(), current))
    }
}
