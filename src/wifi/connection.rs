//! ESP-IDF Wi-Fi station driver.
//!
//! Unlike `BlockingWifi`, which waits on the driver's own timeouts, the
//! associator issues the connect request and polls the interface itself so the
//! attempt is bounded by the caller's timeout and can be cancelled.
//!
//! The driver reports a wrong password as a station disconnect event, not as
//! an error from `connect`. Such an attempt therefore ends as
//! [`AssocError::Timeout`] once the bound elapses; [`AssocError::AuthFailed`]
//! only comes from a driver call that rejects the password outright.

use super::{AssocError, WifiAssociator};
use crate::config::Credential;
use crate::shutdown::{poll_until, WaitAborted};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::{EspError, ESP_ERR_WIFI_PASSWORD, ESP_ERR_WIFI_SSID};
use log::{debug, info, warn};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval between interface state checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wi-Fi station owned by the provisioning session.
pub struct EspWifiAssociator {
    wifi: EspWifi<'static>,
}

impl EspWifiAssociator {
    /// Create the station driver. The radio is started on the first attempt.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, None)?;
        Ok(Self { wifi })
    }

    fn configure(&mut self, config: &Configuration) -> Result<(), AssocError> {
        self.wifi.set_configuration(config).map_err(classify)?;
        if !self.wifi.is_started().map_err(classify)? {
            self.wifi.start().map_err(classify)?;
        }
        Ok(())
    }

    /// Address assigned by DHCP, once the interface is up.
    fn ip(&self) -> Option<IpAddr> {
        match self.wifi.is_up() {
            Ok(true) => {}
            _ => return None,
        }
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        if info.ip == Ipv4Addr::UNSPECIFIED {
            return None;
        }
        Some(IpAddr::V4(info.ip))
    }

    fn abort(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            debug!("disconnect after failed attempt: {:?}", e);
        }
    }
}

impl WifiAssociator for EspWifiAssociator {
    fn connect(
        &mut self,
        credential: &Credential,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IpAddr, AssocError> {
        info!("Connecting to WiFi: {}", credential.ssid());

        // Convert first: a credential the driver rejects keeps the current link.
        let config = client_config(credential)?;

        // Reprovisioning while associated: drop the current network first.
        if self.wifi.is_connected().unwrap_or(false) {
            self.abort();
        }

        self.configure(&config)?;
        self.wifi.connect().map_err(classify)?;

        match poll_until(cancel, timeout, POLL_INTERVAL, || self.ip()) {
            Ok(ip) => {
                info!("Connected to WiFi, IP: {}", ip);
                Ok(ip)
            }
            Err(WaitAborted::TimedOut) => {
                warn!("No IP after {:?}, giving up", timeout);
                self.abort();
                Err(AssocError::Timeout)
            }
            Err(WaitAborted::Cancelled) => {
                self.abort();
                Err(AssocError::Cancelled)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }
}

fn client_config(credential: &Credential) -> Result<Configuration, AssocError> {
    let buffer =
        |field: &str| AssocError::RadioError(format!("{} does not fit driver buffer", field));
    Ok(Configuration::Client(ClientConfiguration {
        ssid: credential.ssid().try_into().map_err(|_| buffer("SSID"))?,
        password: credential.password().try_into().map_err(|_| buffer("password"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    }))
}

/// Map a driver error onto the association taxonomy.
fn classify(e: EspError) -> AssocError {
    match e.code() as u32 {
        ESP_ERR_WIFI_PASSWORD => AssocError::AuthFailed,
        ESP_ERR_WIFI_SSID => AssocError::RadioError("invalid SSID".into()),
        _ => AssocError::RadioError(format!("{:?}", e)),
    }
}
