//! Caller-supplied timeouts, poll cadences and behaviour flags.
//!
//! All durations are expressed in whole seconds when (de)serialized.

use crate::error::{ReconcileError, ReconcileResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings consumed by the reconciler and its workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Overrides the lifecycle's deploy timeout for create.
    #[serde(with = "duration_secs_opt")]
    pub create_timeout: Option<Duration>,
    /// Overrides the lifecycle's deploy timeout for update.
    #[serde(with = "duration_secs_opt")]
    pub update_timeout: Option<Duration>,
    /// Overrides the lifecycle's deploy timeout for delete.
    #[serde(with = "duration_secs_opt")]
    pub delete_timeout: Option<Duration>,
    /// Block create/update until the change is deployed.
    pub wait_for_deployment: bool,
    /// Disable the object on delete but leave it in place.
    pub retain_on_delete: bool,
    #[serde(with = "duration_secs")]
    pub certificate_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub certificate_poll_interval: Duration,
    #[serde(with = "duration_secs")]
    pub stale_token_retry_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub stale_token_retry_interval: Duration,
    #[serde(with = "duration_secs")]
    pub not_disabled_retry_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub not_disabled_retry_interval: Duration,
    /// How long a write rejected for an invalid viewer certificate is resubmitted
    /// while a freshly issued certificate propagates.
    #[serde(with = "duration_secs")]
    pub invalid_certificate_retry_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub invalid_certificate_retry_interval: Duration,
    /// Cadence of user-visible "still waiting" log lines. Does not affect polling.
    #[serde(with = "duration_secs")]
    pub progress_interval: Duration,
    /// Consecutive "not found" reads tolerated while waiting for a present state.
    pub not_found_checks: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            create_timeout: None,
            update_timeout: None,
            delete_timeout: None,
            wait_for_deployment: true,
            retain_on_delete: false,
            certificate_timeout: Duration::from_secs(3 * 60 * 60),
            certificate_poll_interval: Duration::from_secs(60),
            stale_token_retry_timeout: Duration::from_secs(60),
            stale_token_retry_interval: Duration::from_secs(5),
            not_disabled_retry_timeout: Duration::from_secs(3 * 60),
            not_disabled_retry_interval: Duration::from_secs(10),
            invalid_certificate_retry_timeout: Duration::from_secs(60),
            invalid_certificate_retry_interval: Duration::from_secs(5),
            progress_interval: Duration::from_secs(60),
            not_found_checks: 20,
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> ReconcileResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| ReconcileError::InvalidConfig(format!("Failed to parse settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject zero timeouts and intervals; every retry loop must be bounded and must sleep.
    pub fn validate(&self) -> ReconcileResult<()> {
        let required = [
            ("certificate_timeout", Some(self.certificate_timeout)),
            ("certificate_poll_interval", Some(self.certificate_poll_interval)),
            ("stale_token_retry_timeout", Some(self.stale_token_retry_timeout)),
            ("stale_token_retry_interval", Some(self.stale_token_retry_interval)),
            ("not_disabled_retry_timeout", Some(self.not_disabled_retry_timeout)),
            ("not_disabled_retry_interval", Some(self.not_disabled_retry_interval)),
            (
                "invalid_certificate_retry_timeout",
                Some(self.invalid_certificate_retry_timeout),
            ),
            (
                "invalid_certificate_retry_interval",
                Some(self.invalid_certificate_retry_interval),
            ),
            ("progress_interval", Some(self.progress_interval)),
            ("create_timeout", self.create_timeout),
            ("update_timeout", self.update_timeout),
            ("delete_timeout", self.delete_timeout),
        ];

        for (name, value) in required {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(ReconcileError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.not_found_checks == 0 {
            return Err(ReconcileError::InvalidConfig(
                "not_found_checks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}
