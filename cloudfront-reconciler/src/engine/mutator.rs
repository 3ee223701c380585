//! Conflict-retrying mutator.
//!
//! Submits a write with the caller's token and consults the `Mutation` scope of
//! the retry table for every failure. A stale-token answer re-reads the token
//! and resubmits, bounded by the `Reread` attempts. An invalid viewer
//! certificate is resubmitted unchanged on the `Poll` cadence while a new
//! certificate propagates. Any other error is returned as-is, without retry.

use crate::engine::accessor::Accessor;
use crate::engine::retry::{RetryBudget, RetryPolicy, RetryScope, RetryTable};
use crate::error::{
    ApiError, ApiErrorKind, ApiResult, Operation, ReconcileError, ReconcileResult,
};
use crate::resources::ResourceApi;
use crate::types::{ETag, ResourceHandle, Subject, Versioned};
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Mutator<'a, R: ResourceApi> {
    api: &'a R,
    accessor: Accessor<'a, R>,
    retry: &'a RetryTable,
    cancel: &'a CancellationToken,
}

impl<'a, R: ResourceApi> Mutator<'a, R> {
    pub fn new(api: &'a R, retry: &'a RetryTable, cancel: &'a CancellationToken) -> Self {
        Self {
            api,
            accessor: Accessor::new(api),
            retry,
            cancel,
        }
    }

    pub async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &R::Config,
    ) -> ReconcileResult<Versioned<R::Body>> {
        let api = self.api;
        self.submit(handle, etag, Operation::Update, |etag| async move {
            api.update(handle, &etag, config).await
        })
        .await
    }

    pub async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ReconcileResult<()> {
        let api = self.api;
        self.submit(handle, etag, Operation::Delete, |etag| async move {
            api.delete(handle, &etag).await
        })
        .await
    }

    async fn submit<T, F, Fut>(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        operation: Operation,
        mut call: F,
    ) -> ReconcileResult<T>
    where
        F: FnMut(ETag) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let subject = self.accessor.subject(handle);
        let started = Instant::now();
        let mut token = etag.clone();
        let mut attempt = 1;
        let mut budget: Option<RetryBudget> = None;

        loop {
            log::debug!("{operation} {subject} (If-Match: {token}, attempt {attempt})");
            let e = match call(token.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match self.retry.lookup(RetryScope::Mutation, e.kind()) {
                RetryPolicy::Reread { attempts } if attempt < attempts => {
                    log::warn!("{operation} {subject}: {e}; refreshing ETag and retrying");
                    token = self.accessor.read(handle).await?.etag;
                }
                RetryPolicy::Poll { interval, timeout } => {
                    let budget =
                        budget.get_or_insert_with(|| RetryBudget::start(interval, timeout));
                    if budget.is_exhausted() {
                        return Err(give_up(operation, subject, attempt, started, e));
                    }
                    log::warn!("{operation} {subject}: {e}; retrying in {interval:?}");
                    budget.pause(&subject, self.cancel).await?;
                }
                RetryPolicy::Reread { .. } | RetryPolicy::Fatal => {
                    return Err(give_up(operation, subject, attempt, started, e));
                }
            }
            attempt += 1;
        }
    }
}

fn give_up(
    operation: Operation,
    subject: Subject,
    attempts: u32,
    started: Instant,
    source: ApiError,
) -> ReconcileError {
    if source.kind() == ApiErrorKind::StaleToken {
        ReconcileError::StaleToken {
            subject,
            attempts,
            elapsed: started.elapsed(),
            source,
        }
    } else {
        ReconcileError::from_api(operation, subject, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::test_utils::{Call, FakeApi, FakeConfig};
    use crate::types::ResourceKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stale_once_then_success_makes_two_calls() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        let stale = api.current_etag(&handle);
        api.touch(&handle);

        let (retry, cancel) = (RetryTable::default(), CancellationToken::new());
        let mutator = Mutator::new(&api, &retry, &cancel);
        let updated = mutator
            .update(&handle, &stale, &FakeConfig::enabled(false))
            .await
            .unwrap();

        assert_eq!(api.count(|c| matches!(c, Call::Update { .. })), 2);
        assert_eq!(updated.etag, api.current_etag(&handle));
        assert!(!updated.body.enabled);
    }

    #[tokio::test]
    async fn test_stale_twice_fails_after_exactly_two_attempts() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        api.fail_next_update(ApiError::stale_token("PreconditionFailed"));
        api.fail_next_update(ApiError::stale_token("InvalidIfMatchVersion"));

        let (retry, cancel) = (RetryTable::default(), CancellationToken::new());
        let mutator = Mutator::new(&api, &retry, &cancel);
        let err = mutator
            .update(&handle, &api.current_etag(&handle), &FakeConfig::enabled(false))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::StaleToken { attempts: 2, .. }));
        assert_eq!(api.count(|c| matches!(c, Call::Update { .. })), 2);
        assert_eq!(api.count(|c| matches!(c, Call::Get { .. })), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        api.fail_next_update(ApiError::from_code(Some("AccessDenied"), "not authorized"));

        let (retry, cancel) = (RetryTable::default(), CancellationToken::new());
        let mutator = Mutator::new(&api, &retry, &cancel);
        let err = mutator
            .update(&handle, &api.current_etag(&handle), &FakeConfig::enabled(false))
            .await
            .unwrap_err();

        match err {
            ReconcileError::Api { operation, source, .. } => {
                assert_eq!(operation, Operation::Update);
                assert_eq!(source.code(), Some("AccessDenied"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_refreshes_stale_token() {
        let api = FakeApi::new(ResourceKind::CachePolicy);
        let handle = api.seed_deployed("658327ea", false);
        let stale = api.current_etag(&handle);
        api.touch(&handle);

        Mutator::new(&api, &RetryTable::default(), &CancellationToken::new())
            .delete(&handle, &stale)
            .await
            .unwrap();

        assert!(!api.exists(&handle));
        assert_eq!(api.count(|c| matches!(c, Call::Delete(_))), 2);
    }

    #[tokio::test]
    async fn test_fatal_rule_disables_reread() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        let stale = api.current_etag(&handle);
        api.touch(&handle);

        let table = RetryTable::default().with_rule(
            RetryScope::Mutation,
            ApiErrorKind::StaleToken,
            RetryPolicy::Fatal,
        );
        let err = Mutator::new(&api, &table, &CancellationToken::new())
            .update(&handle, &stale, &FakeConfig::enabled(false))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::StaleToken { attempts: 1, .. }));
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_certificate_is_resubmitted_until_it_propagates() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        for _ in 0..2 {
            api.fail_next_update(ApiError::from_code(
                Some("InvalidViewerCertificate"),
                "The specified SSL certificate doesn't exist",
            ));
        }

        let started = Instant::now();
        Mutator::new(&api, &RetryTable::default(), &CancellationToken::new())
            .update(&handle, &api.current_etag(&handle), &FakeConfig::enabled(true))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(api.count(|c| matches!(c, Call::Update { .. })), 3);
        assert_eq!(api.count(|c| matches!(c, Call::Get { .. })), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_certificate_gives_up_after_a_minute() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        for _ in 0..20 {
            api.fail_next_update(ApiError::from_code(
                Some("InvalidViewerCertificate"),
                "certificate chain is invalid",
            ));
        }

        let started = Instant::now();
        let err = Mutator::new(&api, &RetryTable::default(), &CancellationToken::new())
            .update(&handle, &api.current_etag(&handle), &FakeConfig::enabled(true))
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(60));
        match err {
            ReconcileError::Api { source, .. } => {
                assert_eq!(source.kind(), ApiErrorKind::InvalidCertificate);
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(api.count(|c| matches!(c, Call::Update { .. })), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_certificate_retry_observes_cancellation() {
        let api = FakeApi::new(ResourceKind::Distribution);
        let handle = api.seed_deployed("E1", true);
        api.fail_next_update(ApiError::from_code(Some("InvalidViewerCertificate"), "missing"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Mutator::new(&api, &RetryTable::default(), &cancel)
            .update(&handle, &api.current_etag(&handle), &FakeConfig::enabled(true))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Cancelled { .. }));
        assert_eq!(api.count(|c| matches!(c, Call::Update { .. })), 1);
    }
}
