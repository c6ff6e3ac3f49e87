//! Nordic UART Service (NUS) over NimBLE.
//!
//! Phone apps such as nRF Connect or Bluefruit Connect speak this profile out
//! of the box, which makes it the provisioning channel.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: Nordic UART (6E400001-...)
//! ├── RX (Write, Write No Response) - bytes from the central
//! └── TX (Notify)                  - status tokens to the central
//! ```
//!
//! # Security Considerations
//!
//! Credentials travel as plaintext at the application layer. Whatever
//! protection the link has comes from BLE pairing; configuration should be
//! done in a physically controlled environment.

use super::{BleTransport, TransportError};
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, NimbleProperties};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Nordic UART Service UUID.
const UART_SERVICE_UUID: BleUuid = uuid128!("6E400001-B5A3-F393-E0A9-E50E24DCCA9E");

/// RX characteristic (central writes here).
const RX_CHAR_UUID: BleUuid = uuid128!("6E400002-B5A3-F393-E0A9-E50E24DCCA9E");

/// TX characteristic (peripheral notifies here).
const TX_CHAR_UUID: BleUuid = uuid128!("6E400003-B5A3-F393-E0A9-E50E24DCCA9E");

/// Inbound bytes held before the session drains them. Writes past this are dropped.
const MAX_PENDING_BYTES: usize = 1024;

/// BLE UART peripheral backed by the NimBLE stack.
pub struct UartTransport {
    /// Advertised device name.
    name: String,
    /// Set by connect/disconnect callbacks.
    connected: Arc<AtomicBool>,
    /// Bytes written to RX and not yet read.
    inbound: Arc<Mutex<Vec<u8>>>,
    /// TX characteristic used for notifications.
    tx: Arc<NimbleMutex<BLECharacteristic>>,
}

impl UartTransport {
    /// Register the UART service on the NimBLE server.
    ///
    /// Advertising is not started here; the session starts it when it enters Idle.
    pub fn new(name: impl Into<String>) -> Result<Self, TransportError> {
        let device = BLEDevice::take();
        let server = device.get_server();

        let connected = Arc::new(AtomicBool::new(false));
        let inbound = Arc::new(Mutex::new(Vec::new()));

        // The session decides when to advertise again.
        server.advertise_on_disconnect(false);

        let on_connect = connected.clone();
        let connect_inbound = inbound.clone();
        server.on_connect(move |_server, desc| {
            info!("BLE central connected: {:?}", desc.address());
            // A new central starts with an empty queue.
            if let Ok(mut pending) = connect_inbound.lock() {
                pending.clear();
            }
            on_connect.store(true, Ordering::SeqCst);
        });

        let on_disconnect = connected.clone();
        server.on_disconnect(move |desc, reason| {
            info!("BLE central disconnected: {:?} ({:?})", desc.address(), reason);
            on_disconnect.store(false, Ordering::SeqCst);
        });

        let service = server.create_service(UART_SERVICE_UUID);

        // RX characteristic (Write + Write No Response)
        let rx_inbound = inbound.clone();
        let rx_char = service.lock().create_characteristic(
            RX_CHAR_UUID,
            NimbleProperties::WRITE | NimbleProperties::WRITE_NO_RSP,
        );
        rx_char.lock().on_write(move |args| {
            let data = args.recv_data();
            let Ok(mut pending) = rx_inbound.lock() else {
                return;
            };
            // Reject writes that would grow the queue unbounded
            if pending.len() + data.len() > MAX_PENDING_BYTES {
                warn!("Dropped {} byte UART write: inbound queue full", data.len());
                return;
            }
            pending.extend_from_slice(data);
        });

        // TX characteristic (Notify)
        let tx = service
            .lock()
            .create_characteristic(TX_CHAR_UUID, NimbleProperties::NOTIFY);

        Ok(Self {
            name: name.into(),
            connected,
            inbound,
            tx,
        })
    }
}

impl BleTransport for UartTransport {
    fn start_advertising(&mut self) -> Result<(), TransportError> {
        let advertising = BLEDevice::take().get_advertising();

        advertising
            .lock()
            .set_data(
                BLEAdvertisementData::new()
                    .name(&self.name)
                    .add_service_uuid(UART_SERVICE_UUID),
            )
            .map_err(|e| TransportError(format!("set advertisement data: {:?}", e)))?;

        advertising
            .lock()
            .start()
            .map_err(|e| TransportError(format!("start advertising: {:?}", e)))?;

        info!("Advertising as '{}'", self.name);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        BLEDevice::take()
            .get_advertising()
            .lock()
            .stop()
            .map_err(|e| TransportError(format!("stop advertising: {:?}", e)))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn read_available(&mut self) -> Vec<u8> {
        match self.inbound.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        }
    }

    fn notify(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.tx.lock().set_value(data).notify();
        Ok(())
    }
}
