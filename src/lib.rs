//! BLE Wi-Fi provisioning for an ESP32 sensor node.
//!
//! A phone writes `ssid=...;pwd=...;` to a Nordic UART BLE service; the node
//! joins that network, remembers it and from then on connects unattended.
//! An RGB LED shows progress.
//!
//! Everything except the hardware bindings (behind the `esp32` feature) is
//! platform-independent and tested on the host.

pub mod ble;
pub mod config;
pub mod persistence;
pub mod session;
pub mod shutdown;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod status;
pub mod uploader;
pub mod wifi;

// Re-export commonly used items
pub use ble::{BleTransport, FrameAssembler, FrameError, TransportError};
pub use config::{parse, Credential, CredentialError, ParseError, ProvisioningConfig};
pub use persistence::{CredentialStore, StoreError};
pub use session::ProvisioningSession;
pub use status::{DeviceState, Rgb, StatusIndicator};
pub use uploader::{run_upload_loop, TemperatureUploader, UploadCadence, UploaderConfig};
pub use wifi::{AssocError, Connectivity, WifiAssociator};
