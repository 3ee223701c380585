//! Managed certificate follow-up for distribution tenants.
//!
//! Once the tenant has deployed, the managed certificate requested for its
//! domains is polled on its own cadence until it is issued. An issued
//! certificate that differs from the one bound to the tenant is bound with a
//! second update, built from a fresh read so no sibling configuration is
//! lost, and the tenant is waited on again.

use crate::engine::waiter::{wait_for_state, Absence, PollPolicy, WaitSpec};
use crate::engine::EngineContext;
use crate::error::{Operation, ReconcileError, ReconcileResult};
use crate::resources::catalog::MANAGED_CERTIFICATE_STATES;
use crate::resources::{CertificateBinding, ManagedCertificate, ManagedCertificateRequest};
use crate::types::{Observation, ResourceHandle, ResourceKind, Subject, Versioned};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub async fn run<R: CertificateBinding>(
    ctx: &EngineContext<'_, R>,
    handle: &ResourceHandle,
    request: Option<&ManagedCertificateRequest>,
    timeout: Option<Duration>,
) -> ReconcileResult<Versioned<R::Body>> {
    let deployed = ctx.wait_deployed(handle, timeout).await?;
    let Some(request) = request else {
        return Ok(deployed);
    };

    let tenant = ctx.accessor().subject(handle);
    log::info!(
        "Waiting for managed certificate of {tenant} (domain: {}, validation via {:?})",
        request.primary_domain_name.as_deref().unwrap_or("(all)"),
        request.validation_token_host
    );
    let Some(certificate) = wait_for_certificate(ctx, handle, &tenant).await? else {
        log::info!("{tenant} has no managed certificate record; domains are already covered");
        return Ok(deployed);
    };
    let Some(issued_arn) = certificate.certificate_arn else {
        log::warn!("Managed certificate for {tenant} was issued without an ARN; nothing to bind");
        return Ok(deployed);
    };

    let fresh = ctx.accessor().read(handle).await?;
    if ctx.api.bound_certificate(&fresh.body).as_deref() == Some(issued_arn.as_str()) {
        log::info!("{tenant} is already bound to {issued_arn}");
        return Ok(fresh);
    }

    log::info!("Binding {issued_arn} to {tenant}");
    let config = ctx
        .api
        .bind_certificate(&fresh.body, &issued_arn)
        .map_err(|e| ReconcileError::from_api(Operation::Update, tenant.clone(), e))?;
    ctx.mutator().update(handle, &fresh.etag, &config).await?;
    ctx.wait_deployed(handle, timeout).await
}

/// Poll the managed certificate keyed by `handle` until it is issued.
///
/// `None` means the tenant has no managed certificate at all.
async fn wait_for_certificate<R: CertificateBinding>(
    ctx: &EngineContext<'_, R>,
    handle: &ResourceHandle,
    tenant: &Subject,
) -> ReconcileResult<Option<ManagedCertificate>> {
    let spec = WaitSpec::new(
        Subject::new(ResourceKind::ManagedCertificate, handle.clone()),
        ctx.settings.certificate_timeout,
    )
    .pending(MANAGED_CERTIFICATE_STATES.pending)
    .target(MANAGED_CERTIFICATE_STATES.target)
    .failure(MANAGED_CERTIFICATE_STATES.failure)
    .poll(PollPolicy::Fixed(ctx.settings.certificate_poll_interval))
    .progress_every(ctx.settings.progress_interval)
    .on_absent(Absence::Succeed);

    let api = ctx.api;
    let last_arn: Mutex<Option<String>> = Mutex::new(None);
    let last_arn_ref = &last_arn;

    let result = wait_for_state(&spec, ctx.cancel, move || async move {
        match api.get_managed_certificate(handle).await {
            Ok(certificate) => {
                last_arn_ref
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone_from(&certificate.certificate_arn);
                let status = certificate.status.clone();
                Ok(Observation::present(certificate, status))
            }
            Err(e) if e.is_not_found() => Ok(Observation::Absent),
            Err(e) => Err(ReconcileError::from_api(
                Operation::ReadCertificate,
                tenant.clone(),
                e,
            )),
        }
    })
    .await;

    match result {
        Err(ReconcileError::UnexpectedState { status, .. }) => {
            Err(ReconcileError::CertificateFailed {
                tenant: tenant.clone(),
                certificate_arn: last_arn.into_inner().unwrap_or_else(PoisonError::into_inner),
                status,
            })
        }
        other => other,
    }
}
