//! Host stand-in for the Wi-Fi radio.
//!
//! On a development machine the OS handles networking, so "associating"
//! means finding the address of the default route. The credential content
//! is logged by SSID and otherwise ignored.

use super::{AssocError, WifiAssociator};
use crate::config::Credential;
use log::info;
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Associator reporting the host's primary address.
#[derive(Debug, Default)]
pub struct HostAssociator {
    ip_addr: Option<IpAddr>,
}

impl HostAssociator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last address handed out.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.ip_addr
    }

    /// Find the local address of the default route.
    ///
    /// "Connecting" a UDP socket only performs a route lookup; nothing is sent.
    fn detect_local_ip() -> Result<IpAddr, AssocError> {
        let radio = |e: std::io::Error| AssocError::RadioError(e.to_string());
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(radio)?;
        socket.connect("8.8.8.8:80").map_err(radio)?;
        Ok(socket.local_addr().map_err(radio)?.ip())
    }
}

impl WifiAssociator for HostAssociator {
    fn connect(
        &mut self,
        credential: &Credential,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IpAddr, AssocError> {
        if cancel.is_cancelled() {
            return Err(AssocError::Cancelled);
        }
        info!("Host network stands in for '{}'", credential.ssid());
        self.ip_addr = None;
        let ip = Self::detect_local_ip()?;
        self.ip_addr = Some(ip);
        info!("Host network ready, local IP: {}", ip);
        Ok(ip)
    }

    fn is_connected(&self) -> bool {
        self.ip_addr.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new("HostNet", "password").unwrap()
    }

    #[test]
    fn test_not_connected_before_first_attempt() {
        let associator = HostAssociator::new();
        assert!(!associator.is_connected());
        assert_eq!(associator.ip_addr(), None);
    }

    #[test]
    fn test_cancelled_attempt() {
        let mut associator = HostAssociator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = associator.connect(&credential(), Duration::from_secs(1), &cancel);
        assert_eq!(result, Err(AssocError::Cancelled));
        assert!(!associator.is_connected());
    }

    #[test]
    fn test_connect_reports_route_address() {
        // Route lookup fails in air-gapped environments; only check consistency.
        let mut associator = HostAssociator::new();
        let cancel = CancellationToken::new();
        match associator.connect(&credential(), Duration::from_secs(1), &cancel) {
            Ok(ip) => {
                assert!(associator.is_connected());
                assert_eq!(associator.ip_addr(), Some(ip));
            }
            Err(e) => {
                assert!(matches!(e, AssocError::RadioError(_)));
                assert!(!associator.is_connected());
            }
        }
    }
}
