//! Resource seam: the narrow interface the engine uses to talk to the
//! CloudFront client layer, and the per-kind status vocabulary it drives.

pub mod catalog;

use crate::error::ApiResult;
use crate::types::{ETag, ResourceHandle, Versioned};
use async_trait::async_trait;
use std::fmt::Debug;

pub use catalog::{DeployStates, Lifecycle};

/// Read/write access to one CloudFront object type.
///
/// Every method maps to exactly one API call. Implementations must not cache:
/// `get` always re-fetches so the returned token reflects the current version.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    type Body: Clone + Debug + Send + Sync;
    type Config: Clone + Debug + Send + Sync;

    fn lifecycle(&self) -> &Lifecycle;

    /// Observed status string, for kinds that report one.
    fn status(&self, body: &Self::Body) -> Option<String>;

    /// `Some(enabled)` for kinds that must be disabled before deletion.
    fn is_enabled(&self, _body: &Self::Body) -> Option<bool> {
        None
    }

    /// Configuration equal to the body's current configuration with only the
    /// enabled flag cleared.
    fn disabled_config(&self, _body: &Self::Body) -> Option<Self::Config> {
        None
    }

    /// Release objects that have to let go of this one before it can be disabled
    /// and deleted. Returns `true` when that changed the object and it has to
    /// redeploy.
    async fn detach_dependents(
        &self,
        _handle: &ResourceHandle,
        _body: &Self::Body,
    ) -> ApiResult<bool> {
        Ok(false)
    }

    async fn get(&self, handle: &ResourceHandle) -> ApiResult<Versioned<Self::Body>>;

    async fn create(
        &self,
        config: &Self::Config,
    ) -> ApiResult<(ResourceHandle, Versioned<Self::Body>)>;

    async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &Self::Config,
    ) -> ApiResult<Versioned<Self::Body>>;

    async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ApiResult<()>;
}

/// Where the validation token for a managed certificate is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationTokenHost {
    Cloudfront,
    SelfHosted,
}

/// A request for CloudFront to provision a certificate for a tenant's domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedCertificateRequest {
    pub primary_domain_name: Option<String>,
    pub validation_token_host: ValidationTokenHost,
}

/// Current state of the managed certificate keyed by a tenant's handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedCertificate {
    pub certificate_arn: Option<String>,
    pub status: String,
}

/// Objects that carry a bound certificate which a managed certificate can replace.
#[async_trait]
pub trait CertificateBinding: ResourceApi {
    fn bound_certificate(&self, body: &Self::Body) -> Option<String>;

    /// Configuration equal to the body's current configuration with the
    /// certificate replaced.
    fn bind_certificate(&self, body: &Self::Body, certificate_arn: &str)
        -> ApiResult<Self::Config>;

    async fn get_managed_certificate(&self, handle: &ResourceHandle)
        -> ApiResult<ManagedCertificate>;
}
