//! Core identifiers and value types shared by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one managed CloudFront object (distribution ID, tenant ID,
/// key value store name, ...). Assigned by the create call and immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque concurrency token (`ETag`) sent as `If-Match` on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resource body together with the token of the read (or write) that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub body: T,
    pub etag: ETag,
}

impl<T> Versioned<T> {
    pub fn new(body: T, etag: ETag) -> Self {
        Self { body, etag }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            body: f(self.body),
            etag: self.etag,
        }
    }
}

/// Outcome of a create/update that has converged: the handle, the last
/// observed body, and the token that came with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub handle: ResourceHandle,
    pub body: T,
    pub etag: ETag,
}

impl<T> Reconciled<T> {
    pub fn from_versioned(handle: ResourceHandle, versioned: Versioned<T>) -> Self {
        Self {
            handle,
            body: versioned.body,
            etag: versioned.etag,
        }
    }
}

/// A single refresh result fed to the state waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    /// The object exists and reports `status`.
    Present { body: T, status: String },
    /// The read explicitly reported that the object does not exist.
    Absent,
}

impl<T> Observation<T> {
    pub fn present(body: T, status: impl Into<String>) -> Self {
        Self::Present {
            body,
            status: status.into(),
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Present { status, .. } => Some(status),
            Self::Absent => None,
        }
    }
}

/// CloudFront object kinds driven by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Distribution,
    DistributionTenant,
    ConnectionGroup,
    KeyValueStore,
    TrustStore,
    ManagedCertificate,
    CachePolicy,
    OriginRequestPolicy,
    ResponseHeadersPolicy,
    OriginAccessControl,
    KeyGroup,
    PublicKey,
    Function,
    ContinuousDeploymentPolicy,
    FieldLevelEncryptionConfig,
    RealtimeLogConfig,
    VpcOrigin,
    AnycastIpList,
}

impl ResourceKind {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Distribution => "CloudFront Distribution",
            Self::DistributionTenant => "CloudFront Distribution Tenant",
            Self::ConnectionGroup => "CloudFront Connection Group",
            Self::KeyValueStore => "CloudFront Key Value Store",
            Self::TrustStore => "CloudFront Trust Store",
            Self::ManagedCertificate => "CloudFront Managed Certificate",
            Self::CachePolicy => "CloudFront Cache Policy",
            Self::OriginRequestPolicy => "CloudFront Origin Request Policy",
            Self::ResponseHeadersPolicy => "CloudFront Response Headers Policy",
            Self::OriginAccessControl => "CloudFront Origin Access Control",
            Self::KeyGroup => "CloudFront Key Group",
            Self::PublicKey => "CloudFront Public Key",
            Self::Function => "CloudFront Function",
            Self::ContinuousDeploymentPolicy => "CloudFront Continuous Deployment Policy",
            Self::FieldLevelEncryptionConfig => "CloudFront Field-level Encryption Config",
            Self::RealtimeLogConfig => "CloudFront Real-time Log Config",
            Self::VpcOrigin => "CloudFront VPC Origin",
            Self::AnycastIpList => "CloudFront Anycast Static IP List",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Names the object a wait or mutation is about, for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
}

impl Subject {
    pub fn new(kind: ResourceKind, handle: ResourceHandle) -> Self {
        Self { kind, handle }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.handle)
    }
}
