//! Disable-before-delete.
//!
//! CloudFront refuses to delete an object that is enabled or still deploying.
//! This workflow detaches dependents (a distribution's continuous deployment
//! policy), disables the object, waits for the disabled configuration to
//! deploy, deletes it and waits for it to disappear. `NotDisabled` and
//! `StaleToken` answers to the delete call are retried under their workflow
//! rules; every other error is returned immediately.

use crate::engine::retry::{RetryBudget, RetryPolicy, RetryScope};
use crate::engine::EngineContext;
use crate::error::{ApiErrorKind, Operation, ReconcileError, ReconcileResult};
use crate::resources::ResourceApi;
use crate::types::{ETag, ResourceHandle, Subject, Versioned};
use std::collections::HashMap;

/// Run the full workflow. Deleting an object that is already gone succeeds.
pub async fn run<R: ResourceApi>(
    ctx: &EngineContext<'_, R>,
    handle: &ResourceHandle,
) -> ReconcileResult<()> {
    let accessor = ctx.accessor();
    let subject = accessor.subject(handle);

    let Some(current) = accessor.read_optional(handle).await? else {
        log::info!("{subject} is already deleted");
        return Ok(());
    };
    let Some(current) = detach_dependents(ctx, handle, current).await? else {
        log::info!("{subject} disappeared while its dependents were detached");
        return Ok(());
    };
    let Some(current) = ensure_disabled(ctx, handle, current).await? else {
        log::info!("{subject} disappeared while being disabled");
        return Ok(());
    };

    if ctx.settings.retain_on_delete {
        log::warn!("{subject} has been disabled but retained, per retain_on_delete");
        return Ok(());
    }

    log::info!("Deleting {subject}");
    if !delete_with_retry(ctx, handle, &subject, current.etag).await? {
        log::info!("{subject} disappeared before the delete call");
        return Ok(());
    }

    ctx.wait_deleted(handle, ctx.settings.delete_timeout).await?;
    log::info!("Deleted {subject}");
    Ok(())
}

/// Let go of dependents and, if that changed the object, wait for it to redeploy.
/// A dependent that is already gone counts as detached.
async fn detach_dependents<R: ResourceApi>(
    ctx: &EngineContext<'_, R>,
    handle: &ResourceHandle,
    current: Versioned<R::Body>,
) -> ReconcileResult<Option<Versioned<R::Body>>> {
    let subject = ctx.accessor().subject(handle);
    match ctx.api.detach_dependents(handle, &current.body).await {
        Ok(false) => Ok(Some(current)),
        Ok(true) => {
            log::info!("Detached dependents of {subject}, waiting for it to redeploy");
            absent_as_none(ctx.wait_deployed(handle, ctx.settings.delete_timeout).await)
        }
        Err(e) if e.is_not_found() => {
            log::debug!("Dependent of {subject} is already gone: {e}");
            Ok(Some(current))
        }
        Err(e) => Err(ReconcileError::from_api(Operation::Update, subject, e)),
    }
}

/// Bring the object to a deployed, disabled state.
///
/// Returns the latest read, or `None` if the object vanished along the way.
pub async fn ensure_disabled<R: ResourceApi>(
    ctx: &EngineContext<'_, R>,
    handle: &ResourceHandle,
    current: Versioned<R::Body>,
) -> ReconcileResult<Option<Versioned<R::Body>>> {
    let api = ctx.api;
    let subject = ctx.accessor().subject(handle);
    let mut current = current;

    if is_deploying(api, &current.body) {
        log::info!("{subject} is still deploying, waiting before disabling it");
        match absent_as_none(ctx.wait_deployed(handle, ctx.settings.delete_timeout).await)? {
            Some(deployed) => current = deployed,
            None => return Ok(None),
        }
    }

    if api.is_enabled(&current.body) != Some(true) {
        log::debug!("{subject} is already disabled");
        return Ok(Some(current));
    }
    let Some(config) = api.disabled_config(&current.body) else {
        return Ok(Some(current));
    };

    log::info!("Disabling {subject}");
    if absent_as_none(ctx.mutator().update(handle, &current.etag, &config).await)?.is_none() {
        return Ok(None);
    }
    absent_as_none(ctx.wait_deployed(handle, ctx.settings.delete_timeout).await)
}

fn is_deploying<R: ResourceApi>(api: &R, body: &R::Body) -> bool {
    match (&api.lifecycle().deploy, api.status(body)) {
        (Some(deploy), Some(status)) => deploy.pending.contains(&status.as_str()),
        _ => false,
    }
}

fn absent_as_none<T>(result: ReconcileResult<T>) -> ReconcileResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Issue the delete, retrying per the workflow rules.
///
/// Returns `false` when the object turned out to be gone already.
async fn delete_with_retry<R: ResourceApi>(
    ctx: &EngineContext<'_, R>,
    handle: &ResourceHandle,
    subject: &Subject,
    etag: ETag,
) -> ReconcileResult<bool> {
    let mut etag = etag;
    let mut budgets: HashMap<ApiErrorKind, RetryBudget> = HashMap::new();
    let mut attempts = 0;

    loop {
        let error = match ctx.mutator().delete(handle, &etag).await {
            Ok(()) => return Ok(true),
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => e,
        };
        attempts += match &error {
            ReconcileError::StaleToken { attempts: calls, .. } => *calls,
            _ => 1,
        };
        let Some(kind) = error.api_kind() else {
            return Err(error);
        };
        let RetryPolicy::Poll { interval, timeout } = ctx.retry.lookup(RetryScope::Workflow, kind)
        else {
            return Err(error);
        };

        let budget = budgets
            .entry(kind)
            .or_insert_with(|| RetryBudget::start(interval, timeout));
        if budget.is_exhausted() {
            return Err(exhausted(subject, budget, attempts, error));
        }
        log::warn!("Deleting {subject} failed ({error}), retrying in {interval:?}");
        budget.pause(subject, ctx.cancel).await?;

        let Some(current) = ctx.accessor().read_optional(handle).await? else {
            return Ok(false);
        };
        let current = if kind == ApiErrorKind::NotDisabled {
            match ensure_disabled(ctx, handle, current).await? {
                Some(current) => current,
                None => return Ok(false),
            }
        } else {
            current
        };
        etag = current.etag;
    }
}

/// Report a spent budget with the workflow's totals rather than the last call's.
fn exhausted(
    subject: &Subject,
    budget: &RetryBudget,
    attempts: u32,
    error: ReconcileError,
) -> ReconcileError {
    match error {
        ReconcileError::StaleToken { source, .. } => ReconcileError::StaleToken {
            subject: subject.clone(),
            attempts,
            elapsed: budget.elapsed(),
            source,
        },
        ReconcileError::Api { source, .. } if source.kind() == ApiErrorKind::NotDisabled => {
            ReconcileError::NotDisabled {
                subject: subject.clone(),
                elapsed: budget.elapsed(),
                source,
            }
        }
        other => other,
    }
}
