//! Wi-Fi association.
//!
//! The provisioning session talks to the radio through [`WifiAssociator`]:
//! one bounded attempt per call, no internal retry.
//!
//! # Components
//!
//! - [`connection`] - ESP-IDF station driver (ESP32 only)
//! - [`host`] - development host, where the OS owns networking

#[cfg(feature = "esp32")]
mod connection;
#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
pub use connection::EspWifiAssociator;
#[cfg(not(feature = "esp32"))]
pub use host::HostAssociator;

use crate::config::Credential;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Joins a Wi-Fi network.
pub trait WifiAssociator {
    /// Make one association attempt, blocking for at most `timeout`.
    ///
    /// Returns the assigned address. Cancelling `cancel` aborts the wait and
    /// yields [`AssocError::Cancelled`].
    fn connect(
        &mut self,
        credential: &Credential,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IpAddr, AssocError>;

    /// Whether the station is currently associated.
    fn is_connected(&self) -> bool;
}

/// Why an association attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssocError {
    /// The network did not come up within the timeout.
    Timeout,
    /// The access point rejected the password.
    AuthFailed,
    /// Driver or radio failure.
    RadioError(String),
    /// Aborted by shutdown.
    Cancelled,
}

impl AssocError {
    /// Short token for status notifications.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::AuthFailed => "auth",
            Self::RadioError(_) => "radio",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AssocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "association timed out"),
            Self::AuthFailed => write!(f, "authentication rejected"),
            Self::RadioError(e) => write!(f, "radio error: {}", e),
            Self::Cancelled => write!(f, "association cancelled"),
        }
    }
}

impl std::error::Error for AssocError {}

/// Shared "is the network associated" flag.
///
/// The session owns the writer side; collaborators such as the uploader
/// hold clones and only read it.
#[derive(Debug, Clone, Default)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_up(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, up: bool) {
        self.0.store(up, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_clones_share_state() {
        let connectivity = Connectivity::new();
        let reader = connectivity.clone();
        assert!(!reader.is_up());
        connectivity.set(true);
        assert!(reader.is_up());
        connectivity.set(false);
        assert!(!reader.is_up());
    }

    #[test]
    fn test_assoc_error_reasons() {
        assert_eq!(AssocError::Timeout.reason(), "timeout");
        assert_eq!(AssocError::AuthFailed.reason(), "auth");
        assert_eq!(AssocError::RadioError("x".into()).reason(), "radio");
        assert_eq!(
            AssocError::RadioError("beacon lost".into()).to_string(),
            "radio error: beacon lost"
        );
    }
}
