//! Distribution tenants and the managed certificates CloudFront issues for
//! them. The bound certificate lives in the tenant's customizations, so
//! binding an issued certificate is a tenant update.

use super::{sdk_error, versioned};
use crate::error::{ApiError, ApiResult};
use crate::resources::{CertificateBinding, Lifecycle, ManagedCertificate, ResourceApi};
use crate::types::{ETag, ResourceHandle, ResourceKind, Versioned};
use async_trait::async_trait;
use aws_sdk_cloudfront::types::{
    Certificate, Customizations, DistributionTenant, DomainItem, DomainResult, Parameter,
};
use aws_sdk_cloudfront::Client;

/// Writable fields of a distribution tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionTenantConfig {
    pub distribution_id: String,
    pub name: String,
    pub domains: Vec<String>,
    pub connection_group_id: Option<String>,
    pub customizations: Option<Customizations>,
    pub parameters: Option<Vec<Parameter>>,
    pub enabled: bool,
}

impl DistributionTenantConfig {
    /// Rebuild the writable configuration from a read.
    pub fn from_body(body: &DistributionTenant) -> Self {
        Self {
            distribution_id: Option::<String>::from(body.distribution_id.clone())
                .unwrap_or_default(),
            name: Option::<String>::from(body.name.clone()).unwrap_or_default(),
            domains: Option::<Vec<DomainResult>>::from(body.domains.clone())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|domain| Option::<String>::from(domain.domain))
                .collect(),
            connection_group_id: Option::<String>::from(body.connection_group_id.clone()),
            customizations: Option::<Customizations>::from(body.customizations.clone()),
            parameters: Option::<Vec<Parameter>>::from(body.parameters.clone()),
            enabled: Option::<bool>::from(body.enabled).unwrap_or(true),
        }
    }

    /// The same configuration with `certificate_arn` as the bound certificate.
    pub fn with_certificate(mut self, certificate_arn: &str) -> ApiResult<Self> {
        let certificate = Certificate::builder()
            .arn(certificate_arn)
            .build()
            .map_err(|e| ApiError::generic(format!("certificate {certificate_arn}: {e}")))?;
        let mut customizations = self
            .customizations
            .take()
            .unwrap_or_else(|| Customizations::builder().build());
        customizations.certificate = Some(certificate);
        self.customizations = Some(customizations);
        Ok(self)
    }

    pub fn certificate_arn(&self) -> Option<String> {
        certificate_arn(self.customizations.clone())
    }

    fn domain_items(&self) -> ApiResult<Vec<DomainItem>> {
        self.domains
            .iter()
            .map(|domain| {
                DomainItem::builder()
                    .domain(domain)
                    .build()
                    .map_err(|e| ApiError::generic(format!("domain {domain}: {e}")))
            })
            .collect()
    }
}

fn certificate_arn(customizations: Option<Customizations>) -> Option<String> {
    customizations
        .and_then(|customizations| customizations.certificate)
        .and_then(|certificate| Option::<String>::from(certificate.arn))
        .filter(|arn| !arn.is_empty())
}

pub struct DistributionTenantApi {
    client: Client,
    lifecycle: Lifecycle,
}

impl DistributionTenantApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            lifecycle: Lifecycle::for_kind(ResourceKind::DistributionTenant),
        }
    }
}

#[async_trait]
impl ResourceApi for DistributionTenantApi {
    type Body = DistributionTenant;
    type Config = DistributionTenantConfig;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn status(&self, body: &DistributionTenant) -> Option<String> {
        Option::<String>::from(body.status.clone())
    }

    fn is_enabled(&self, body: &DistributionTenant) -> Option<bool> {
        Option::<bool>::from(body.enabled)
    }

    fn disabled_config(&self, body: &DistributionTenant) -> Option<DistributionTenantConfig> {
        Some(DistributionTenantConfig {
            enabled: false,
            ..DistributionTenantConfig::from_body(body)
        })
    }

    async fn get(&self, handle: &ResourceHandle) -> ApiResult<Versioned<DistributionTenant>> {
        let context = format!("GetDistributionTenant {handle}");
        let output = self
            .client
            .get_distribution_tenant()
            .identifier(handle.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.distribution_tenant().cloned(), output.e_tag())
    }

    async fn create(
        &self,
        config: &DistributionTenantConfig,
    ) -> ApiResult<(ResourceHandle, Versioned<DistributionTenant>)> {
        let context = format!("CreateDistributionTenant {}", config.name);
        let output = self
            .client
            .create_distribution_tenant()
            .distribution_id(&config.distribution_id)
            .name(&config.name)
            .set_domains(Some(config.domain_items()?))
            .set_connection_group_id(config.connection_group_id.clone())
            .set_customizations(config.customizations.clone())
            .set_parameters(config.parameters.clone())
            .enabled(config.enabled)
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        let created = versioned(&context, output.distribution_tenant().cloned(), output.e_tag())?;
        let id = Option::<String>::from(created.body.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::generic(format!("{context}: response has no Id")))?;
        Ok((ResourceHandle::new(id), created))
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        etag: &ETag,
        config: &DistributionTenantConfig,
    ) -> ApiResult<Versioned<DistributionTenant>> {
        let context = format!("UpdateDistributionTenant {handle}");
        let output = self
            .client
            .update_distribution_tenant()
            .id(handle.as_str())
            .if_match(etag.as_str())
            .distribution_id(&config.distribution_id)
            .set_domains(Some(config.domain_items()?))
            .set_connection_group_id(config.connection_group_id.clone())
            .set_customizations(config.customizations.clone())
            .set_parameters(config.parameters.clone())
            .enabled(config.enabled)
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        versioned(&context, output.distribution_tenant().cloned(), output.e_tag())
    }

    async fn delete(&self, handle: &ResourceHandle, etag: &ETag) -> ApiResult<()> {
        let context = format!("DeleteDistributionTenant {handle}");
        self.client
            .delete_distribution_tenant()
            .id(handle.as_str())
            .if_match(etag.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        Ok(())
    }
}

#[async_trait]
impl CertificateBinding for DistributionTenantApi {
    fn bound_certificate(&self, body: &DistributionTenant) -> Option<String> {
        certificate_arn(Option::<Customizations>::from(body.customizations.clone()))
    }

    fn bind_certificate(
        &self,
        body: &DistributionTenant,
        certificate_arn: &str,
    ) -> ApiResult<DistributionTenantConfig> {
        DistributionTenantConfig::from_body(body).with_certificate(certificate_arn)
    }

    async fn get_managed_certificate(
        &self,
        handle: &ResourceHandle,
    ) -> ApiResult<ManagedCertificate> {
        let context = format!("GetManagedCertificateDetails {handle}");
        let output = self
            .client
            .get_managed_certificate_details()
            .identifier(handle.as_str())
            .send()
            .await
            .map_err(|e| sdk_error(&context, &e))?;
        let details = output
            .managed_certificate_details()
            .ok_or_else(|| ApiError::not_found(format!("{context}: no managed certificate")))?;
        Ok(ManagedCertificate {
            certificate_arn: details.certificate_arn().map(str::to_string),
            status: details
                .certificate_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}
