//! Status vocabulary and wait timing for each CloudFront object kind.

use crate::engine::waiter::PollPolicy;
use crate::types::ResourceKind;
use std::time::Duration;

pub const STATUS_IN_PROGRESS: &str = "InProgress";
pub const STATUS_DEPLOYED: &str = "Deployed";

pub const KEY_VALUE_STORE_PROVISIONING: &str = "PROVISIONING";
pub const KEY_VALUE_STORE_READY: &str = "READY";
pub const KEY_VALUE_STORE_FAILED: &str = "FAILED";

pub const TRUST_STORE_PENDING: &str = "pending";
pub const TRUST_STORE_ACTIVE: &str = "active";
pub const TRUST_STORE_FAILED: &str = "failed";

pub const CERTIFICATE_PENDING_VALIDATION: &str = "pending-validation";
pub const CERTIFICATE_ISSUED: &str = "issued";
pub const CERTIFICATE_FAILED: &str = "failed";
pub const CERTIFICATE_VALIDATION_TIMED_OUT: &str = "validation-timed-out";
pub const CERTIFICATE_EXPIRED: &str = "expired";
pub const CERTIFICATE_REVOKED: &str = "revoked";
pub const CERTIFICATE_INACTIVE: &str = "inactive";

const EDGE_DEPLOY: DeployStates = DeployStates {
    pending: &[STATUS_IN_PROGRESS],
    target: &[STATUS_DEPLOYED],
    failure: &[],
};

/// Issuance states of a tenant's managed certificate.
pub const MANAGED_CERTIFICATE_STATES: DeployStates = DeployStates {
    pending: &[CERTIFICATE_PENDING_VALIDATION],
    target: &[CERTIFICATE_ISSUED],
    failure: &[
        CERTIFICATE_FAILED,
        CERTIFICATE_VALIDATION_TIMED_OUT,
        CERTIFICATE_EXPIRED,
        CERTIFICATE_REVOKED,
        CERTIFICATE_INACTIVE,
    ],
};

/// Status sets that drive a deployment wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStates {
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
    pub failure: &'static [&'static str],
}

impl DeployStates {
    /// States an object can still report after a successful delete call.
    pub fn deleting(&self) -> Vec<&'static str> {
        self.pending
            .iter()
            .chain(self.target.iter())
            .copied()
            .collect()
    }
}

/// How one object kind converges and how long the engine waits for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    pub kind: ResourceKind,
    /// `None` for kinds whose mutations take effect synchronously.
    pub deploy: Option<DeployStates>,
    /// Consecutive target reads required before a deploy wait succeeds.
    pub min_target_observations: u32,
    pub deploy_timeout: Duration,
    /// Pause before the first read of a deploy wait.
    pub deploy_delay: Duration,
    /// Pause before the first read of a delete wait.
    pub delete_delay: Duration,
    pub poll: PollPolicy,
    /// Writes against one handle must hold that handle's lease.
    pub serialize_writes: bool,
}

impl Lifecycle {
    pub fn for_kind(kind: ResourceKind) -> Self {
        let synchronous = Self {
            kind,
            deploy: None,
            min_target_observations: 1,
            deploy_timeout: Duration::from_secs(15 * 60),
            deploy_delay: Duration::ZERO,
            delete_delay: Duration::ZERO,
            poll: PollPolicy::Fixed(Duration::from_secs(15)),
            serialize_writes: false,
        };

        match kind {
            ResourceKind::Distribution => Self {
                deploy: Some(EDGE_DEPLOY),
                deploy_timeout: Duration::from_secs(90 * 60),
                deploy_delay: Duration::from_secs(30),
                delete_delay: Duration::from_secs(15),
                ..synchronous
            },
            ResourceKind::DistributionTenant | ResourceKind::ConnectionGroup => Self {
                deploy: Some(EDGE_DEPLOY),
                min_target_observations: 2,
                deploy_timeout: Duration::from_secs(30 * 60),
                ..synchronous
            },
            ResourceKind::KeyValueStore => Self {
                deploy: Some(DeployStates {
                    pending: &[KEY_VALUE_STORE_PROVISIONING],
                    target: &[KEY_VALUE_STORE_READY],
                    failure: &[KEY_VALUE_STORE_FAILED],
                }),
                serialize_writes: true,
                ..synchronous
            },
            ResourceKind::TrustStore => Self {
                deploy: Some(DeployStates {
                    pending: &[TRUST_STORE_PENDING],
                    target: &[TRUST_STORE_ACTIVE],
                    failure: &[TRUST_STORE_FAILED],
                }),
                deploy_timeout: Duration::from_secs(30 * 60),
                ..synchronous
            },
            ResourceKind::ManagedCertificate => Self {
                deploy: Some(MANAGED_CERTIFICATE_STATES),
                deploy_timeout: Duration::from_secs(3 * 60 * 60),
                poll: PollPolicy::Fixed(Duration::from_secs(60)),
                ..synchronous
            },
            ResourceKind::CachePolicy
            | ResourceKind::OriginRequestPolicy
            | ResourceKind::ResponseHeadersPolicy
            | ResourceKind::OriginAccessControl
            | ResourceKind::KeyGroup
            | ResourceKind::PublicKey
            | ResourceKind::Function
            | ResourceKind::ContinuousDeploymentPolicy
            | ResourceKind::FieldLevelEncryptionConfig
            | ResourceKind::RealtimeLogConfig
            | ResourceKind::VpcOrigin
            | ResourceKind::AnycastIpList => synchronous,
        }
    }

    pub fn has_deploy_status(&self) -> bool {
        self.deploy.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ResourceKind::Distribution, 1, 90 * 60)]
    #[case(ResourceKind::DistributionTenant, 2, 30 * 60)]
    #[case(ResourceKind::ConnectionGroup, 2, 30 * 60)]
    #[case(ResourceKind::KeyValueStore, 1, 15 * 60)]
    #[case(ResourceKind::ManagedCertificate, 1, 3 * 60 * 60)]
    fn test_deploy_timing(
        #[case] kind: ResourceKind,
        #[case] min_targets: u32,
        #[case] timeout_secs: u64,
    ) {
        let lifecycle = Lifecycle::for_kind(kind);
        assert!(lifecycle.has_deploy_status());
        assert_eq!(lifecycle.min_target_observations, min_targets);
        assert_eq!(lifecycle.deploy_timeout, Duration::from_secs(timeout_secs));
    }

    #[test]
    fn test_policies_have_no_deploy_status() {
        let lifecycle = Lifecycle::for_kind(ResourceKind::CachePolicy);
        assert!(!lifecycle.has_deploy_status());
        assert!(!lifecycle.serialize_writes);
    }

    #[test]
    fn test_only_key_value_store_serializes_writes() {
        assert!(Lifecycle::for_kind(ResourceKind::KeyValueStore).serialize_writes);
        assert!(!Lifecycle::for_kind(ResourceKind::Distribution).serialize_writes);
    }

    #[test]
    fn test_deleting_states_cover_pending_and_target() {
        let deploy = Lifecycle::for_kind(ResourceKind::Distribution)
            .deploy
            .unwrap();
        assert_eq!(deploy.deleting(), vec![STATUS_IN_PROGRESS, STATUS_DEPLOYED]);
    }
}
