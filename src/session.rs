//! Provisioning session: the state machine tying the link, parser, radio,
//! store and indicator together.
//!
//! ```text
//! Boot ──(saved credential)──► Connecting ──► Success
//!   │                                  └────► Error
//!   ▼
//! Idle (advertising) ◄──disconnect── BleConnected ──frame──► Connecting ──► Success | Error
//!        └───────────connect───────────►▲                                         │
//!                                       └─────────────── link stays open ─────────┘
//! ```
//!
//! The session owns every hardware handle it drives. It runs on one thread;
//! association attempts are synchronous, so at most one is ever in flight.

use crate::ble::{BleTransport, FrameAssembler};
use crate::config::{
    parse, parse_fields, Credential, CredentialFields, ParseError, ProvisioningConfig,
};
use crate::persistence::CredentialStore;
use crate::shutdown::sleep_or_cancel;
use crate::status::{DeviceState, StatusIndicator};
use crate::wifi::{AssocError, Connectivity, WifiAssociator};
use log::{debug, error, info, warn};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroize;

/// Provisioning state machine over injected hardware.
pub struct ProvisioningSession<T, W, S, I> {
    transport: T,
    radio: W,
    store: S,
    indicator: I,
    assembler: FrameAssembler,
    /// Fields of a credential split across frames.
    pending: CredentialFields,
    /// When the first of the pending fields arrived.
    pending_since: Option<Instant>,
    state: DeviceState,
    /// Whether a central was connected at the last poll.
    link_up: bool,
    wifi_up: Connectivity,
    config: ProvisioningConfig,
}

impl<T, W, S, I> ProvisioningSession<T, W, S, I>
where
    T: BleTransport,
    W: WifiAssociator,
    S: CredentialStore,
    I: StatusIndicator,
{
    /// Take ownership of the hardware and show [`DeviceState::Boot`].
    pub fn new(
        transport: T,
        radio: W,
        store: S,
        mut indicator: I,
        config: ProvisioningConfig,
    ) -> Self {
        indicator.set(DeviceState::Boot);
        Self {
            transport,
            radio,
            store,
            indicator,
            assembler: FrameAssembler::new(config.max_frame_len),
            pending: CredentialFields::default(),
            pending_since: None,
            state: DeviceState::Boot,
            link_up: false,
            wifi_up: Connectivity::new(),
            config,
        }
    }

    /// Try the saved credential, if any, without touching BLE.
    ///
    /// Returns `true` when the network is up.
    pub fn auto_connect(&mut self, cancel: &CancellationToken) -> bool {
        let Some(credential) = self.store.load() else {
            info!("No saved credential, BLE provisioning required");
            return false;
        };
        info!("Trying saved network '{}'", credential.ssid());
        self.associate(&credential, cancel)
    }

    /// Serve BLE provisioning until `cancel` fires.
    ///
    /// Advertises, serves one central at a time and goes back to advertising
    /// after each disconnect. Stops advertising before returning.
    pub fn run(&mut self, cancel: &CancellationToken) {
        while self.wait_for_central(cancel) {
            self.serve_central(cancel);
            if cancel.is_cancelled() {
                break;
            }
        }

        if let Err(e) = self.transport.stop_advertising() {
            warn!("Failed to stop advertising: {}", e);
        }
        info!("Provisioning stopped");
    }

    /// Whether the network is currently associated.
    pub fn is_connected(&self) -> bool {
        self.wifi_up.is_up()
    }

    /// Read-only connectivity handle for collaborators.
    pub fn connectivity(&self) -> Connectivity {
        self.wifi_up.clone()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn radio(&self) -> &W {
        &self.radio
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Advertise and block until a central connects.
    ///
    /// Returns `false` if cancelled first.
    fn wait_for_central(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match self.transport.start_advertising() {
                Ok(()) => {
                    self.enter(DeviceState::Idle);
                    break;
                }
                Err(e) => {
                    error!("Cannot advertise: {}", e);
                    self.enter(DeviceState::Error);
                    if sleep_or_cancel(cancel, self.config.poll_interval) {
                        return false;
                    }
                }
            }
        }

        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if self.transport.is_connected() {
                return true;
            }
            if sleep_or_cancel(cancel, self.config.poll_interval) {
                return false;
            }
        }
    }

    /// Feed inbound bytes to the assembler while the central stays connected.
    fn serve_central(&mut self, cancel: &CancellationToken) {
        self.link_up = true;
        self.enter(DeviceState::BleConnected);

        while self.transport.is_connected() {
            if cancel.is_cancelled() {
                return;
            }

            let bytes = self.transport.read_available();
            if bytes.is_empty() {
                if sleep_or_cancel(cancel, self.config.poll_interval) {
                    return;
                }
                continue;
            }

            match self.assembler.feed(&bytes) {
                Ok(Some(mut frame)) => {
                    self.handle_frame(&frame, cancel);
                    frame.zeroize();
                }
                Ok(None) => {}
                Err(e) => warn!("Discarding BLE input: {}", e),
            }
        }

        info!("Central disconnected");
        self.link_up = false;
        self.assembler.reset();
        self.clear_pending();

        // Writes the departed central made after the last read.
        let mut stale = self.transport.read_available();
        if !stale.is_empty() {
            debug!("Discarding {} unread bytes", stale.len());
            stale.zeroize();
        }
    }

    /// Act on one complete frame.
    fn handle_frame(&mut self, frame: &str, cancel: &CancellationToken) {
        let credential = match parse(frame) {
            Ok(credential) => {
                self.clear_pending();
                credential
            }
            Err(ParseError::Empty) => {
                warn!("Ignoring empty frame");
                self.clear_pending();
                return;
            }
            Err(e) => {
                let fields = parse_fields(frame);
                if fields.is_empty() {
                    warn!("Ignoring frame: {}", e);
                    self.clear_pending();
                    return;
                }
                if self
                    .pending_since
                    .is_some_and(|since| since.elapsed() >= self.config.pending_timeout)
                {
                    debug!("Partial credential expired");
                    self.clear_pending();
                }
                self.pending_since.get_or_insert_with(Instant::now);
                self.pending.merge(fields);
                match self.pending.to_credential() {
                    Ok(credential) => {
                        self.clear_pending();
                        credential
                    }
                    Err(ParseError::MissingFields) => {
                        debug!("Holding partial credential {:?}", self.pending);
                        return;
                    }
                    Err(e) => {
                        warn!("Rejected credential: {}", e);
                        self.clear_pending();
                        return;
                    }
                }
            }
        };

        if self.associate(&credential, cancel) {
            if let Err(e) = self.store.save(&credential) {
                error!("Connected but could not persist credential: {}", e);
            }
        }
    }

    /// One bounded association attempt, reflected in state and connectivity.
    fn associate(&mut self, credential: &Credential, cancel: &CancellationToken) -> bool {
        self.enter(DeviceState::Connecting);

        match self.radio.connect(credential, self.config.wifi_timeout, cancel) {
            Ok(ip) => {
                self.wifi_up.set(true);
                self.enter_with(DeviceState::Success, &format!("success:{}", ip));
                true
            }
            Err(AssocError::Cancelled) => {
                info!("Association cancelled");
                self.wifi_up.set(self.radio.is_connected());
                false
            }
            Err(e) => {
                warn!("Could not join '{}': {}", credential.ssid(), e);
                // A failed attempt may have dropped the previous network.
                self.wifi_up.set(self.radio.is_connected());
                self.enter_with(DeviceState::Error, &format!("error:{}", e.reason()));
                false
            }
        }
    }

    fn clear_pending(&mut self) {
        self.pending.zeroize();
        self.pending_since = None;
    }

    fn enter(&mut self, state: DeviceState) {
        self.enter_with(state, state.as_str());
    }

    /// Switch state, update the indicator and tell a connected central.
    fn enter_with(&mut self, state: DeviceState, token: &str) {
        if self.state != state {
            debug!("State {} -> {}", self.state, state);
        }
        self.state = state;
        self.indicator.set(state);

        if self.link_up {
            if let Err(e) = self.transport.notify(token.as_bytes()) {
                warn!("Status notification failed: {}", e);
            }
        }
    }
}
