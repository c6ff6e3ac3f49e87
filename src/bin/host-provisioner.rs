//! Run the provisioning session on a development machine.
//!
//! Stdin stands in for the BLE UART: type `ssid=MyNet;pwd=Secr3t!;` and
//! press Enter. The host's own network stands in for the Wi-Fi radio, and the
//! accepted credential is written to `~/.ble-wifi-provisioner/credentials.bin`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-provisioner            # reuse the saved credential if any
//! cargo run --bin host-provisioner -- --clear # forget it first
//! RUST_LOG=debug cargo run --bin host-provisioner
//! ```
//!
//! `PROVISION_DEVICE_NAME` and `PROVISION_WIFI_TIMEOUT_SECS` override the defaults.

#[cfg(not(feature = "esp32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use ble_wifi_provisioner::ble::StdioTransport;
    use ble_wifi_provisioner::persistence::FileCredentialStore;
    use ble_wifi_provisioner::status::LogIndicator;
    use ble_wifi_provisioner::wifi::HostAssociator;
    use ble_wifi_provisioner::{CredentialStore, ProvisioningConfig, ProvisioningSession};
    use log::{error, info};
    use tokio_util::sync::CancellationToken;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Host provisioner starting ===");

    let config = ProvisioningConfig::from_env();

    let mut store = match FileCredentialStore::open_default() {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot locate credential file: {}", e);
            std::process::exit(1);
        }
    };

    if std::env::args().skip(1).any(|arg| arg == "--clear") {
        match store.clear() {
            Ok(()) => info!("Cleared saved credential at {:?}", store.path()),
            Err(e) => {
                error!("Failed to clear saved credential: {}", e);
                std::process::exit(1);
            }
        }
    }

    let transport = match StdioTransport::new(config.device_name.clone()) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to start stdin reader: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let session_cancel = cancel.clone();
    let radio = HostAssociator::new();
    let indicator = LogIndicator::new();
    let mut session = ProvisioningSession::new(transport, radio, store, indicator, config);

    // The session blocks between polls; keep it off the runtime thread.
    let mut session_task = tokio::task::spawn_blocking(move || {
        if session.auto_connect(&session_cancel) {
            info!("Saved credential accepted, provisioning skipped");
            return;
        }
        info!("Type ssid=<name>;pwd=<password>; and press Enter (Ctrl+C to exit)");
        session.run(&session_cancel);
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            cancel.cancel();
            if let Err(e) = session_task.await {
                error!("Session task error: {}", e);
            }
        }
        result = &mut session_task => {
            if let Err(e) = result {
                error!("Session task error: {}", e);
            }
        }
    }

    info!("Shutdown complete");
}

#[cfg(feature = "esp32")]
fn main() {
    println!("host-provisioner runs on a development host.");
    println!("Build it without the 'esp32' feature.");
}
