//! Sensor node firmware.
//!
//! Boots, tries the saved network, and falls back to BLE provisioning as
//! `Sensor-Provision`. Temperature uploads run on their own thread once the
//! network is up.
//!
//! Flash with Adafruit IO settings baked in:
//!
//! ```bash
//! AIO_USERNAME=alice AIO_KEY=aio_xxx cargo espflash flash --features esp32 --release
//! ```

#[cfg(feature = "esp32")]
fn main() {
    use log::{error, info};
    use std::time::Duration;

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== BLE Wi-Fi provisioner starting ===");

    if let Err(e) = firmware::run() {
        error!("Startup failed: {}", e);
        // Give the log a moment to reach the serial console
        std::thread::sleep(Duration::from_secs(5));
        esp_idf_hal::reset::restart();
    }
}

#[cfg(feature = "esp32")]
mod firmware {
    use ble_wifi_provisioner::ble::UartTransport;
    use ble_wifi_provisioner::persistence::NvsCredentialStore;
    use ble_wifi_provisioner::status::NeoPixel;
    use ble_wifi_provisioner::uploader::{ChipTemperature, EspFeedClient};
    use ble_wifi_provisioner::wifi::EspWifiAssociator;
    use ble_wifi_provisioner::{
        run_upload_loop, ProvisioningConfig, ProvisioningSession, TemperatureUploader,
        UploadCadence, UploaderConfig,
    };
    use esp_idf_hal::gpio::OutputPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::{info, warn};
    use tokio_util::sync::CancellationToken;

    /// Stack for the uploader thread; TLS handshakes need the headroom.
    const UPLOADER_STACK_SIZE: usize = 16 * 1024;

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        // QT Py ESP32-S3: NeoPixel data on GPIO39, power on GPIO38
        let led = NeoPixel::new(
            peripherals.rmt.channel0,
            peripherals.pins.gpio39,
            Some(peripherals.pins.gpio38.downgrade_output()),
        )?;

        let config = ProvisioningConfig::default();
        let transport = UartTransport::new(config.device_name.clone())?;
        let radio = EspWifiAssociator::new(peripherals.modem, sysloop)?;
        let store = NvsCredentialStore::new(nvs)?;

        // Never cancelled on the device; the loops run until power-off.
        let cancel = CancellationToken::new();
        let mut session = ProvisioningSession::new(transport, radio, store, led, config);
        let connected = session.auto_connect(&cancel);

        let uploader = match UploaderConfig::from_build_env() {
            Some(uploader_config) => {
                let sensor = ChipTemperature::new(peripherals.temp_sensor)?;
                let client = EspFeedClient::new();
                let mut uploader = TemperatureUploader::new(sensor, client, uploader_config);
                let connectivity = session.connectivity();
                let uploader_cancel = cancel.clone();
                Some(
                    std::thread::Builder::new()
                        .name("uploader".into())
                        .stack_size(UPLOADER_STACK_SIZE)
                        .spawn(move || {
                            let cadence = UploadCadence::default();
                            run_upload_loop(&mut uploader, &connectivity, cadence, &uploader_cancel)
                        })?,
                )
            }
            None => {
                warn!("AIO_USERNAME/AIO_KEY not set at build time, uploads disabled");
                None
            }
        };

        if connected {
            info!("Saved network accepted, BLE provisioning skipped");
        } else {
            session.run(&cancel);
        }

        // Keep the session, and with it the Wi-Fi driver, alive.
        match uploader {
            Some(handle) => {
                if handle.join().is_err() {
                    warn!("Uploader thread panicked");
                }
            }
            None => loop {
                std::thread::park();
            },
        }
        Ok(())
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-provisioner' to provision from a development host.");
}
