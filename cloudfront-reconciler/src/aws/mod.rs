//! AWS SDK integration: `ResourceApi` adapters over `aws-sdk-cloudfront`
//! and classification of service errors into `ApiErrorKind`.

pub mod connection_group;
pub mod distribution;
pub mod distribution_tenant;
pub mod key_value_store;

use crate::error::{ApiError, ApiResult};
use crate::types::{ETag, Versioned};
use aws_sdk_cloudfront::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cloudfront::Client;
use std::fmt::Debug;

pub use connection_group::{ConnectionGroupApi, ConnectionGroupConfig};
pub use distribution::DistributionApi;
pub use distribution_tenant::{DistributionTenantApi, DistributionTenantConfig};
pub use key_value_store::{KeyValueStoreApi, KeyValueStoreConfig};

/// Holds the CloudFront client and hands out per-kind adapters.
#[derive(Debug, Clone)]
pub struct CloudFrontService {
    client: Client,
}

impl CloudFrontService {
    /// Create a service using the default credential provider chain.
    pub async fn new() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn distributions(&self) -> DistributionApi {
        DistributionApi::new(self.client.clone())
    }

    pub fn distribution_tenants(&self) -> DistributionTenantApi {
        DistributionTenantApi::new(self.client.clone())
    }

    pub fn connection_groups(&self) -> ConnectionGroupApi {
        ConnectionGroupApi::new(self.client.clone())
    }

    pub fn key_value_stores(&self) -> KeyValueStoreApi {
        KeyValueStoreApi::new(self.client.clone())
    }
}

/// Convert an SDK failure into an `ApiError`, keeping the service error code.
pub(crate) fn sdk_error<E, R>(context: &str, err: &SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    match err.as_service_error() {
        Some(service) => from_metadata(context, service.code(), service.message()),
        None => ApiError::generic(format!("{context}: {err:?}")),
    }
}

fn from_metadata(context: &str, code: Option<&str>, message: Option<&str>) -> ApiError {
    let detail = message.or(code).unwrap_or("unknown service error");
    ApiError::from_code(code, format!("{context}: {detail}"))
}

/// Pair a response body with the ETag header that came with it.
pub(crate) fn versioned<T>(
    context: &str,
    body: Option<T>,
    e_tag: Option<&str>,
) -> ApiResult<Versioned<T>> {
    let body =
        body.ok_or_else(|| ApiError::generic(format!("{context}: response has no body")))?;
    let e_tag =
        e_tag.ok_or_else(|| ApiError::generic(format!("{context}: response has no ETag")))?;
    Ok(Versioned::new(body, ETag::new(e_tag)))
}
