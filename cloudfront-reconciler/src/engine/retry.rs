//! Error-kind to retry-policy table shared by the mutator and the delete workflow.
//!
//! Only `StaleToken`, `NotDisabled` and `InvalidCertificate` are ever retried,
//! and only by the layer that owns the rule. Every other kind is fatal and
//! propagates unchanged.

use crate::config::Settings;
use crate::error::{ApiErrorKind, ReconcileError, ReconcileResult};
use crate::types::Subject;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Layer consulting the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryScope {
    /// A single mutation call.
    Mutation,
    /// A multi-step workflow that re-invokes the mutator.
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Fatal,
    /// Re-read the token and resubmit; `attempts` counts every submission.
    Reread { attempts: u32 },
    /// Remediate (or just wait) and retry on a fixed interval until `timeout` has elapsed.
    Poll { interval: Duration, timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRule {
    pub scope: RetryScope,
    pub kind: ApiErrorKind,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTable {
    rules: Vec<RetryRule>,
}

impl RetryTable {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rules: vec![
                RetryRule {
                    scope: RetryScope::Mutation,
                    kind: ApiErrorKind::StaleToken,
                    policy: RetryPolicy::Reread { attempts: 2 },
                },
                RetryRule {
                    scope: RetryScope::Mutation,
                    kind: ApiErrorKind::InvalidCertificate,
                    policy: RetryPolicy::Poll {
                        interval: settings.invalid_certificate_retry_interval,
                        timeout: settings.invalid_certificate_retry_timeout,
                    },
                },
                RetryRule {
                    scope: RetryScope::Workflow,
                    kind: ApiErrorKind::StaleToken,
                    policy: RetryPolicy::Poll {
                        interval: settings.stale_token_retry_interval,
                        timeout: settings.stale_token_retry_timeout,
                    },
                },
                RetryRule {
                    scope: RetryScope::Workflow,
                    kind: ApiErrorKind::NotDisabled,
                    policy: RetryPolicy::Poll {
                        interval: settings.not_disabled_retry_interval,
                        timeout: settings.not_disabled_retry_timeout,
                    },
                },
            ],
        }
    }

    pub fn lookup(&self, scope: RetryScope, kind: ApiErrorKind) -> RetryPolicy {
        self.rules
            .iter()
            .find(|rule| rule.scope == scope && rule.kind == kind)
            .map_or(RetryPolicy::Fatal, |rule| rule.policy)
    }

    /// Replace (or add) the rule for `scope` and `kind`.
    #[must_use]
    pub fn with_rule(mut self, scope: RetryScope, kind: ApiErrorKind, policy: RetryPolicy) -> Self {
        self.rules
            .retain(|rule| !(rule.scope == scope && rule.kind == kind));
        self.rules.push(RetryRule {
            scope,
            kind,
            policy,
        });
        self
    }
}

impl Default for RetryTable {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Time budget for one `Poll` rule inside a workflow run.
#[derive(Debug)]
pub struct RetryBudget {
    started: Instant,
    interval: Duration,
    timeout: Duration,
}

impl RetryBudget {
    pub fn start(interval: Duration, timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            interval,
            timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// Sleep one interval (never past the budget), observing cancellation.
    pub async fn pause(&self, subject: &Subject, cancel: &CancellationToken) -> ReconcileResult<()> {
        let remaining = self.timeout.saturating_sub(self.elapsed());
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ReconcileError::Cancelled {
                subject: subject.clone(),
                last_status: "(retrying)".to_string(),
            }),
            () = sleep(self.interval.min(remaining)) => Ok(()),
        }
    }
}
