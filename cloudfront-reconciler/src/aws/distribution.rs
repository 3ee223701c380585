//! Distributions: `GetDistribution`, `CreateDistribution`,
//! `UpdateDistribution` and `DeleteDistribution`, plus disabling an attached
//! continuous deployment policy before the distribution is deleted.

use super::{sdk_error, versioned};
use crate::error::{ApiError, ApiResult};
use crate::resources::{Lifecycle, ResourceApi};
use crate::types::{ETag, ResourceHandle, ResourceKind, Versioned};
use async_trait::async_trait;
use aws_sdk_cloudfront::types::{
    ContinuousDeploymentPolicyConfig, Distribution, DistributionConfig,
};
use aws_sdk_cloudfront::Client;

pub struct DistributionApi {
    client: Client,
    lifecycle: Lifecycle,
}

impl DistributionApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            lifecycle: Lifecycle::for_kind(ResourceKind::Distribution),
        }
    }
}

/// The deployed configuration with `Enabled` cleared and everything else kept.
fn disabled(body: &Distribution) -> Option<DistributionConfig> {
    let mut config = Option::<DistributionConfig>::from(body.distribution_config.clone())?;
    config.enabled = false.into();
    Some(config)
}

fn continuous_deployment_policy_id(body: &Distribution) -> Option<String> {
    Option::<DistributionConfig>::from(body.distribution_config.clone())
        .and_then(|config| Option::<String>::from(config.continuous_deployment_policy_id))
        .filter(|id| !id.is_empty())
}

#[async_trait]
impl ResourceApi for DistributionApi {
    type Body = Distribution;
    type Config = DistributionConfig;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn status(&self, body: &Distribution) -> Option<String> {
        Option::<String>::from(body.status.clone())
    }

    fn is_enabled(&self, body: &Distribution) -> Option<bool> {
        Option::<DistributionConfig>::from(body.distribution_config.clone())
            .and_then(|config| Option::<bool>::from(config.enabled))
    }

    fn disabled_config(&self, body: &Distribution) -> Option<DistributionConfig> {
        disabled(body)
    }

    async fn detach_dependents(
        &self,
        handle: &ResourceHandle,
        body: &Distribution,
    ) -> ApiResult<bool> {
        let Some(policy_id) = continuous_deployment_policy_id(body) else {
            return Ok(false);
        };

        let context = format!("GetContinuousDeploymentPolicy {policy_id}");
        let output = self
            .client
            .get_continuous_deployment_policy()
            .id(&policy_id)
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        let current = versioned(
            &context,
            output.continuous_deployment_policy().cloned(),
            output.e_tag(),
        )?;
        let Some(mut config) = Option::<ContinuousDeploymentPolicyConfig>::from(
            current.body.continuous_deployment_policy_config.clone(),
        ) else {
            return Ok(false);
        };
        if Option::<bool>::from(config.enabled) == Some(false) {
            return Ok(false);
        }

        log::info!("Disabling continuous deployment policy {policy_id} of distribution {handle}");
        config.enabled = false.into();
        let context = format!("UpdateContinuousDeploymentPolicy {policy_id}");
        self.client
            .update_continuous_deployment_policy()
            .id(&policy_id)
            .if_match(current.etag.as_str())
            .continuous_deployment_policy_config(config)
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        Ok(true)
    }

    async fn get(&self, handle: &ResourceHandle) -> ApiResult<Versioned<Distribution>> {
        let context = format!("GetDistribution {handle}");
        let output = self
            .client
            .get_distribution()
            .id(handle.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.distribution().cloned(), output.e_tag())
    }

    async fn create(
        &self,
        config: &DistributionConfig,
    ) -> ApiResult<(ResourceHandle, Versioned<Distribution>)> {
        let context = "CreateDistribution";
        let output = self
            .client
            .create_distribution()
            .distribution_config(config.clone())
            .send()
            .await
            .map_err(|e| sdk_error(context, &e))?;
        let created = versioned(context, output.distribution().cloned(), output.e_tag())?;
        let id = Option::<String>::from(created.body.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::generic(format!("{context}: response has no Id")))?;
        Ok((ResourceHandle::new(id), created))
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &DistributionConfig,
    ) -> ApiResult<Versioned<Distribution>> {
        let context = format!("UpdateDistribution {handle}");
        let output = self
            .client
            .update_distribution()
            .id(handle.as_str())
            .if_match(etag.as_str())
            .distribution_config(config.clone())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.distribution().cloned(), output.e_tag())
    }

    async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ApiResult<()> {
        let context = format!("DeleteDistribution {handle}");
        self.client
            .delete_distribution()
            .id(handle.as_str())
            .if_match(etag.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        Ok(())
    }
}
