//! This crate drives CloudFront objects through their asynchronous lifecycle:
//! - Versioned reads and conflict-retrying writes keyed on the `ETag`
//! - Poll-based waiters for deployment and deletion
//! - Disable-before-delete and managed certificate workflows
//! - `aws-sdk-cloudfront` adapters for distributions, distribution tenants,
//!   connection groups and key value stores
//!

pub mod aws;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod resources;
pub mod types;
pub mod workflows;

// Test utilities are available in both unit tests and integration tests
#[cfg(any(test, feature = "integ-test"))]
pub mod test_utils;

// Re-exports for a small, focused public API
pub use commands::Reconciler;
pub use config::Settings;
pub use engine::lock::{LeaseKey, LeaseMap};
pub use engine::retry::{RetryPolicy, RetryScope, RetryTable};
pub use error::{ApiError, ApiErrorKind, ReconcileError, ReconcileResult};
pub use resources::{
    CertificateBinding, Lifecycle, ManagedCertificate, ManagedCertificateRequest, ResourceApi,
    ValidationTokenHost,
};
pub use types::{ETag, Observation, Reconciled, ResourceHandle, ResourceKind, Subject, Versioned};
