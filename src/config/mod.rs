//! Credential types, message parsing and runtime configuration.
//!
//! # Components
//!
//! - [`credential`] - validated Wi-Fi credential (host-testable)
//! - [`parser`] - `ssid=...;pwd=...` message parser (host-testable)
//! - [`ProvisioningConfig`] - timing and limits of a provisioning session

mod credential;
mod parser;

use std::time::Duration;

pub use credential::{Credential, CredentialError, MAX_PASSWORD_LEN, MAX_SSID_LEN};
pub use parser::{parse, parse_fields, CredentialFields, ParseError, PASSWORD_KEY, SSID_KEY};

/// Default BLE advertisement name.
pub const DEFAULT_DEVICE_NAME: &str = "Sensor-Provision";

/// How long a single association attempt may take.
pub const WIFI_TIMEOUT: Duration = Duration::from_secs(15);

/// Sleep between polls of the BLE link while waiting for a central or bytes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest unterminated frame kept before the buffer is reset.
pub const MAX_FRAME_LEN: usize = 256;

/// How long the first half of a split credential waits for the second.
pub const PENDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of a provisioning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Name advertised over BLE.
    pub device_name: String,
    /// Bound on each Wi-Fi association attempt.
    pub wifi_timeout: Duration,
    /// Cooperative sleep between link polls.
    pub poll_interval: Duration,
    /// Frame buffer cap in bytes.
    pub max_frame_len: usize,
    /// Age at which a partial credential is discarded.
    pub pending_timeout: Duration,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            wifi_timeout: WIFI_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            max_frame_len: MAX_FRAME_LEN,
            pending_timeout: PENDING_TIMEOUT,
        }
    }
}

impl ProvisioningConfig {
    /// Defaults overridden by `PROVISION_DEVICE_NAME` and
    /// `PROVISION_WIFI_TIMEOUT_SECS` when set.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("PROVISION_DEVICE_NAME") {
            if !name.trim().is_empty() {
                config.device_name = name.trim().to_string();
            }
        }

        if let Ok(secs) = std::env::var("PROVISION_WIFI_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.wifi_timeout = Duration::from_secs(secs),
                _ => log::warn!("Ignoring invalid PROVISION_WIFI_TIMEOUT_SECS={:?}", secs),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.device_name, DEFAULT_DEVICE_NAME);
        assert_eq!(config.wifi_timeout, Duration::from_secs(15));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_frame_len, 256);
        assert_eq!(config.pending_timeout, Duration::from_secs(30));
    }
}
