//! Key value stores. The store name is the handle; every write to one store
//! runs under that store's lease.

use super::{sdk_error, versioned};
use crate::error::ApiResult;
use crate::resources::{Lifecycle, ResourceApi};
use crate::types::{ETag, ResourceHandle, ResourceKind, Versioned};
use async_trait::async_trait;
use aws_sdk_cloudfront::types::KeyValueStore;
use aws_sdk_cloudfront::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueStoreConfig {
    pub name: String,
    pub comment: Option<String>,
}

pub struct KeyValueStoreApi {
    client: Client,
    lifecycle: Lifecycle,
}

impl KeyValueStoreApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            lifecycle: Lifecycle::for_kind(ResourceKind::KeyValueStore),
        }
    }
}

#[async_trait]
impl ResourceApi for KeyValueStoreApi {
    type Body = KeyValueStore;
    type Config = KeyValueStoreConfig;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn status(&self, body: &KeyValueStore) -> Option<String> {
        Option::<String>::from(body.status.clone())
    }

    async fn get(&self, handle: &ResourceHandle) -> ApiResult<Versioned<KeyValueStore>> {
        let context = format!("DescribeKeyValueStore {handle}");
        let output = self
            .client
            .describe_key_value_store()
            .name(handle.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.key_value_store().cloned(), output.e_tag())
    }

    async fn create(
        &self,
        config: &KeyValueStoreConfig,
    ) -> ApiResult<(ResourceHandle, Versioned<KeyValueStore>)> {
        let context = format!("CreateKeyValueStore {}", config.name);
        let output = self
            .client
            .create_key_value_store()
            .name(&config.name)
            .set_comment(config.comment.clone())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        let created = versioned(&context, output.key_value_store().cloned(), output.e_tag())?;
        Ok((ResourceHandle::new(config.name.clone()), created))
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &KeyValueStoreConfig,
    ) -> ApiResult<Versioned<KeyValueStore>> {
        let context = format!("UpdateKeyValueStore {handle}");
        let output = self
            .client
            .update_key_value_store()
            .name(handle.as_str())
            .comment(config.comment.clone().unwrap_or_default())
            .if_match(etag.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.key_value_store().cloned(), output.e_tag())
    }

    async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ApiResult<()> {
        let context = format!("DeleteKeyValueStore {handle}");
        self.client
            .delete_key_value_store()
            .name(handle.as_str())
            .if_match(etag.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        Ok(())
    }
}
