//! Connection groups. Like distributions they carry an enabled flag and must
//! be disabled and deployed before they can be deleted.

use super::{sdk_error, versioned};
use crate::error::{ApiError, ApiResult};
use crate::resources::{Lifecycle, ResourceApi};
use crate::types::{ETag, ResourceHandle, ResourceKind, Versioned};
use async_trait::async_trait;
use aws_sdk_cloudfront::types::ConnectionGroup;
use aws_sdk_cloudfront::Client;

/// Writable fields of a connection group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionGroupConfig {
    pub name: String,
    pub ipv6_enabled: Option<bool>,
    pub anycast_ip_list_id: Option<String>,
    pub enabled: bool,
}

impl ConnectionGroupConfig {
    /// Rebuild the writable configuration from a read.
    pub fn from_body(body: &ConnectionGroup) -> Self {
        Self {
            name: Option::<String>::from(body.name.clone()).unwrap_or_default(),
            ipv6_enabled: Option::<bool>::from(body.ipv6_enabled),
            anycast_ip_list_id: Option::<String>::from(body.anycast_ip_list_id.clone()),
            enabled: Option::<bool>::from(body.enabled).unwrap_or(true),
        }
    }
}

pub struct ConnectionGroupApi {
    client: Client,
    lifecycle: Lifecycle,
}

impl ConnectionGroupApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            lifecycle: Lifecycle::for_kind(ResourceKind::ConnectionGroup),
        }
    }
}

#[async_trait]
impl ResourceApi for ConnectionGroupApi {
    type Body = ConnectionGroup;
    type Config = ConnectionGroupConfig;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn status(&self, body: &ConnectionGroup) -> Option<String> {
        Option::<String>::from(body.status.clone())
    }

    fn is_enabled(&self, body: &ConnectionGroup) -> Option<bool> {
        Option::<bool>::from(body.enabled)
    }

    fn disabled_config(&self, body: &ConnectionGroup) -> Option<ConnectionGroupConfig> {
        Some(ConnectionGroupConfig {
            enabled: false,
            ..ConnectionGroupConfig::from_body(body)
        })
    }

    async fn get(&self, handle: &ResourceHandle) -> ApiResult<Versioned<ConnectionGroup>> {
        let context = format!("GetConnectionGroup {handle}");
        let output = self
            .client
            .get_connection_group()
            .identifier(handle.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.connection_group().cloned(), output.e_tag())
    }

    async fn create(
        &self,
        config: &ConnectionGroupConfig,
    ) -> ApiResult<(ResourceHandle, Versioned<ConnectionGroup>)> {
        let context = format!("CreateConnectionGroup {}", config.name);
        let output = self
            .client
            .create_connection_group()
            .name(&config.name)
            .set_ipv6_enabled(config.ipv6_enabled)
            .set_anycast_ip_list_id(config.anycast_ip_list_id.clone())
            .enabled(config.enabled)
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        let created = versioned(&context, output.connection_group().cloned(), output.e_tag())?;
        let id = Option::<String>::from(created.body.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::generic(format!("{context}: response has no Id")))?;
        Ok((ResourceHandle::new(id), created))
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &ConnectionGroupConfig,
    ) -> ApiResult<Versioned<ConnectionGroup>> {
        let context = format!("UpdateConnectionGroup {handle}");
        let output = self
            .client
            .update_connection_group()
            .id(handle.as_str())
            .if_match(etag.as_str())
            .set_ipv6_enabled(config.ipv6_enabled)
            .set_anycast_ip_list_id(config.anycast_ip_list_id.clone())
            .enabled(config.enabled)
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.connection_group().cloned(), output.e_tag())
    }

    async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ApiResult<()> {
        let context = format!("DeleteConnectionGroup {handle}");
        self.client
            .delete_connection_group()
            .id(handle.as_str())
            .if_match(etag.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        Ok(())
    }
}

