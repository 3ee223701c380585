//! Error taxonomy for the client layer and the reconciliation engine.

use crate::types::{ResourceHandle, ResourceKind, Subject};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Closed set of error classes the CloudFront client layer can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// The object does not exist.
    NotFound,
    /// The `If-Match` token no longer matches the current version.
    StaleToken,
    /// The object must be disabled (and deployed) before it can be deleted.
    NotDisabled,
    /// The viewer certificate is not visible to CloudFront yet.
    InvalidCertificate,
    /// Anything else: permissions, validation, quotas.
    Generic,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::StaleToken => "stale concurrency token",
            Self::NotDisabled => "not disabled",
            Self::InvalidCertificate => "invalid viewer certificate",
            Self::Generic => "error",
        };
        f.write_str(name)
    }
}

/// Service error codes and the class each one belongs to.
/// `PreconditionFailed` and `InvalidIfMatchVersion` are the same condition.
const ERROR_CODE_TABLE: &[(&str, ApiErrorKind)] = &[
    ("NoSuchDistribution", ApiErrorKind::NotFound),
    ("NoSuchResource", ApiErrorKind::NotFound),
    ("EntityNotFound", ApiErrorKind::NotFound),
    ("NoSuchCachePolicy", ApiErrorKind::NotFound),
    ("NoSuchOriginRequestPolicy", ApiErrorKind::NotFound),
    ("NoSuchResponseHeadersPolicy", ApiErrorKind::NotFound),
    ("NoSuchFunctionExists", ApiErrorKind::NotFound),
    ("NoSuchPublicKey", ApiErrorKind::NotFound),
    ("NoSuchOriginAccessControl", ApiErrorKind::NotFound),
    ("NoSuchContinuousDeploymentPolicy", ApiErrorKind::NotFound),
    ("PreconditionFailed", ApiErrorKind::StaleToken),
    ("InvalidIfMatchVersion", ApiErrorKind::StaleToken),
    ("DistributionNotDisabled", ApiErrorKind::NotDisabled),
    ("ResourceNotDisabled", ApiErrorKind::NotDisabled),
    ("IllegalDelete", ApiErrorKind::NotDisabled),
    ("InvalidViewerCertificate", ApiErrorKind::InvalidCertificate),
];

/// Error returned by a `ResourceApi` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ApiErrorKind,
    code: Option<String>,
    message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Build an error from a service error code, classifying it through the code table.
    pub fn from_code(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: code.map_or(ApiErrorKind::Generic, classify_code),
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_code(Some("NoSuchResource"), message)
    }

    pub fn stale_token(message: impl Into<String>) -> Self {
        Self::from_code(Some("PreconditionFailed"), message)
    }

    pub fn not_disabled(message: impl Into<String>) -> Self {
        Self::from_code(Some("ResourceNotDisabled"), message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Generic, message)
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }
}

/// Map a CloudFront error code to its class.
pub fn classify_code(code: &str) -> ApiErrorKind {
    ERROR_CODE_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(ApiErrorKind::Generic, |(_, kind)| *kind)
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The API call a `ReconcileError::Api` failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    ReadCertificate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Read => "reading",
            Self::Create => "creating",
            Self::Update => "updating",
            Self::Delete => "deleting",
            Self::ReadCertificate => "reading managed certificate for",
        };
        f.write_str(verb)
    }
}

/// Errors surfaced by the reconciliation engine.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{subject} not found")]
    NotFound { subject: Subject },

    #[error("{subject}: concurrency token still stale after {attempts} attempts in {elapsed:?}: {source}")]
    StaleToken {
        subject: Subject,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: ApiError,
    },

    #[error("deleting {subject}: still not disabled after {elapsed:?}: {source}")]
    NotDisabled {
        subject: Subject,
        elapsed: Duration,
        #[source]
        source: ApiError,
    },

    #[error("waiting for {subject}: unexpected state '{status}', wanted target {target:?}")]
    UnexpectedState {
        subject: Subject,
        status: String,
        target: Vec<String>,
    },

    #[error("timeout while waiting for {subject} to become {target:?} (last state: '{last_status}', timeout: {timeout:?})")]
    Timeout {
        subject: Subject,
        last_status: String,
        target: Vec<String>,
        timeout: Duration,
    },

    #[error("waiting for {subject} was cancelled (last state: '{last_status}')")]
    Cancelled { subject: Subject, last_status: String },

    #[error("managed certificate {} for {tenant} failed with status '{status}'", .certificate_arn.as_deref().unwrap_or("(pending)"))]
    CertificateFailed {
        tenant: Subject,
        certificate_arn: Option<String>,
        status: String,
    },

    #[error("{operation} {subject}: {source}")]
    Api {
        operation: Operation,
        subject: Subject,
        #[source]
        source: ApiError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ReconcileError {
    /// Wrap a client error, promoting `NotFound` so callers can match on it.
    pub fn from_api(operation: Operation, subject: Subject, source: ApiError) -> Self {
        if source.is_not_found() {
            Self::NotFound { subject }
        } else {
            Self::Api {
                operation,
                subject,
                source,
            }
        }
    }

    pub fn not_found(kind: ResourceKind, handle: ResourceHandle) -> Self {
        Self::NotFound {
            subject: Subject::new(kind, handle),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Client-layer class behind this error, if it came from an API call.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::NotFound { .. } => Some(ApiErrorKind::NotFound),
            Self::StaleToken { .. } => Some(ApiErrorKind::StaleToken),
            Self::NotDisabled { .. } => Some(ApiErrorKind::NotDisabled),
            Self::Api { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// A timed-out resource may still converge; a later manual retry can succeed.
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The last status observed before the error, when there was one.
    pub fn last_status(&self) -> Option<&str> {
        match self {
            Self::UnexpectedState { status, .. } | Self::CertificateFailed { status, .. } => {
                Some(status)
            }
            Self::Timeout { last_status, .. } | Self::Cancelled { last_status, .. } => {
                Some(last_status)
            }
            _ => None,
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_codes() {
        assert_eq!(classify_code("NoSuchDistribution"), ApiErrorKind::NotFound);
        assert_eq!(classify_code("PreconditionFailed"), ApiErrorKind::StaleToken);
        assert_eq!(classify_code("InvalidIfMatchVersion"), ApiErrorKind::StaleToken);
        assert_eq!(
            classify_code("DistributionNotDisabled"),
            ApiErrorKind::NotDisabled
        );
        assert_eq!(
            classify_code("InvalidViewerCertificate"),
            ApiErrorKind::InvalidCertificate
        );
        assert_eq!(classify_code("AccessDenied"), ApiErrorKind::Generic);
    }

    #[test]
    fn test_missing_code_is_generic() {
        let err = ApiError::from_code(None, "dispatch failure");
        assert_eq!(err.kind(), ApiErrorKind::Generic);
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_from_api_promotes_not_found() {
        let subject = Subject::new(ResourceKind::Distribution, "E1".into());
        let err = ReconcileError::from_api(
            Operation::Read,
            subject.clone(),
            ApiError::not_found("gone"),
        );
        assert!(err.is_not_found());

        let err = ReconcileError::from_api(Operation::Read, subject, ApiError::generic("denied"));
        assert!(matches!(err, ReconcileError::Api { .. }));
    }

    #[test]
    fn test_timeout_message_includes_last_status() {
        let err = ReconcileError::Timeout {
            subject: Subject::new(ResourceKind::Distribution, "E1".into()),
            last_status: "InProgress".to_string(),
            target: vec!["Deployed".to_string()],
            timeout: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("InProgress"));
        assert!(err.is_retryable_later());
        assert_eq!(err.last_status(), Some("InProgress"));
    }
}
