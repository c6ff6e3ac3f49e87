//! Deterministic in-memory stand-ins for the session's hardware.
//!
//! Used by the unit tests and, with the `sim` feature, by downstream crates
//! that want to drive a [`ProvisioningSession`](crate::ProvisioningSession)
//! without a radio.
//!
//! ```ignore
//! use ble_wifi_provisioner::sim::{
//!     FakeRadio, MemoryCredentialStore, RecordingIndicator, ScriptedTransport, Step,
//! };
//! use ble_wifi_provisioner::{ProvisioningConfig, ProvisioningSession};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let transport = ScriptedTransport::new([
//!     Step::Connect,
//!     Step::receive("ssid=Home;pwd=hunter22;"),
//! ])
//! .cancel_when_drained(cancel.clone());
//!
//! let config = ProvisioningConfig {
//!     poll_interval: std::time::Duration::ZERO,
//!     ..Default::default()
//! };
//! let mut session = ProvisioningSession::new(
//!     transport,
//!     FakeRadio::succeeding(),
//!     MemoryCredentialStore::new(),
//!     RecordingIndicator::new(),
//!     config,
//! );
//! session.run(&cancel);
//! assert!(session.is_connected());
//! ```

use crate::ble::{BleTransport, TransportError};
use crate::config::Credential;
use crate::persistence::{decode_record, encode_record, CredentialStore, StoreError};
use crate::shutdown::{poll_until, WaitAborted};
use crate::status::{DeviceState, StatusIndicator};
use crate::wifi::{AssocError, WifiAssociator};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Address handed out by [`FakeRadio::succeeding`].
pub const FAKE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2));

/// Link check interval of [`FakeRadio::unreachable`].
const UNREACHABLE_POLL: Duration = Duration::from_millis(5);

// ==================== Transport ====================

/// One event in a [`ScriptedTransport`] script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A central connects.
    Connect,
    /// The central writes these bytes (one transport read).
    Receive(Vec<u8>),
    /// The central disconnects.
    Disconnect,
    /// The central writes these bytes and disconnects before they are read.
    DisconnectWithUnread(Vec<u8>),
}

impl Step {
    pub fn receive(bytes: impl AsRef<[u8]>) -> Self {
        Self::Receive(bytes.as_ref().to_vec())
    }
}

/// BLE transport that replays a fixed script.
///
/// Each [`is_connected`](BleTransport::is_connected) poll applies at most one
/// link step; each `Receive` step is returned by one
/// [`read_available`](BleTransport::read_available) call. Bytes left by
/// `DisconnectWithUnread` stay queued, like the NimBLE inbound queue, until
/// someone reads them.
/// Once the script is drained the attached token, if any, is cancelled so
/// the session's otherwise endless loop returns.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: RefCell<VecDeque<Step>>,
    connected: Cell<bool>,
    /// Written but not yet read.
    unread: RefCell<Vec<u8>>,
    advertising: bool,
    advertise_count: usize,
    notifications: Vec<String>,
    cancel_when_drained: Option<CancellationToken>,
    fail_advertising: bool,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: RefCell::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Cancel `token` once every step has been consumed.
    pub fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.cancel_when_drained = Some(token);
        self
    }

    /// Make every `start_advertising` call fail.
    pub fn failing_advertising(mut self) -> Self {
        self.fail_advertising = true;
        self
    }

    /// Times advertising was started.
    pub fn advertise_count(&self) -> usize {
        self.advertise_count
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Notification payloads sent to the central, in order.
    pub fn notifications(&self) -> &[String] {
        &self.notifications
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.borrow().len()
    }

    /// Bytes written by a central and never read.
    pub fn unread(&self) -> usize {
        self.unread.borrow().len()
    }

    /// Apply at most one pending link step.
    fn apply_link_step(&self) {
        let mut script = self.script.borrow_mut();
        if !matches!(script.front(), Some(Step::Receive(_)) | None) {
            match script.pop_front() {
                Some(Step::Connect) => self.connected.set(true),
                Some(Step::Disconnect) => self.connected.set(false),
                Some(Step::DisconnectWithUnread(bytes)) => {
                    self.unread.borrow_mut().extend(bytes);
                    self.connected.set(false);
                }
                Some(Step::Receive(_)) | None => {}
            }
        }
        self.cancel_if_drained(&script);
    }

    fn cancel_if_drained(&self, script: &VecDeque<Step>) {
        if script.is_empty() {
            if let Some(token) = &self.cancel_when_drained {
                token.cancel();
            }
        }
    }
}

impl BleTransport for ScriptedTransport {
    fn start_advertising(&mut self) -> Result<(), TransportError> {
        if self.fail_advertising {
            return Err(TransportError("advertising unavailable".into()));
        }
        self.advertising = true;
        self.advertise_count += 1;
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        self.advertising = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.apply_link_step();
        self.connected.get()
    }

    fn read_available(&mut self) -> Vec<u8> {
        let mut bytes = std::mem::take(self.unread.get_mut());
        let script = self.script.get_mut();
        if matches!(script.front(), Some(Step::Receive(_))) {
            if let Some(Step::Receive(received)) = script.pop_front() {
                bytes.extend(received);
            }
        }
        bytes
    }

    fn notify(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.notifications
            .push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }
}

// ==================== Radio ====================

/// Wi-Fi associator with scripted outcomes.
///
/// Each attempt takes the next queued outcome; when the queue is empty the
/// default outcome is used. Like the ESP32 station, a failed attempt leaves
/// the radio unassociated unless [`keeping_link`](Self::keeping_link) is set.
#[derive(Debug)]
pub struct FakeRadio {
    outcomes: VecDeque<Result<IpAddr, AssocError>>,
    default: Result<IpAddr, AssocError>,
    attempts: Vec<Credential>,
    timeouts: Vec<Duration>,
    connected: bool,
    keep_link: bool,
    unreachable: bool,
}

impl FakeRadio {
    /// Every attempt succeeds with [`FAKE_IP`].
    pub fn succeeding() -> Self {
        Self::with_default(Ok(FAKE_IP))
    }

    /// Every attempt fails with `error`.
    pub fn failing(error: AssocError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default: Result<IpAddr, AssocError>) -> Self {
        Self {
            outcomes: VecDeque::new(),
            default,
            attempts: Vec::new(),
            timeouts: Vec::new(),
            connected: false,
            keep_link: false,
            unreachable: false,
        }
    }

    /// Every attempt waits out its whole timeout, like an access point that
    /// never answers.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::failing(AssocError::Timeout)
        }
    }

    /// Failed attempts leave an existing association in place.
    pub fn keeping_link(mut self) -> Self {
        self.keep_link = true;
        self
    }

    /// Queue outcomes used before the default.
    pub fn then(mut self, outcome: Result<IpAddr, AssocError>) -> Self {
        self.outcomes.push_back(outcome);
        self
    }

    /// Credentials of every attempt, in order.
    pub fn attempts(&self) -> &[Credential] {
        &self.attempts
    }

    /// Timeout passed to every attempt, in order.
    pub fn timeouts(&self) -> &[Duration] {
        &self.timeouts
    }
}

impl WifiAssociator for FakeRadio {
    fn connect(
        &mut self,
        credential: &Credential,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IpAddr, AssocError> {
        self.attempts.push(credential.clone());
        self.timeouts.push(timeout);
        let outcome = if cancel.is_cancelled() {
            Err(AssocError::Cancelled)
        } else if self.unreachable {
            match poll_until(cancel, timeout, UNREACHABLE_POLL, || None::<IpAddr>) {
                Ok(ip) => Ok(ip),
                Err(WaitAborted::TimedOut) => Err(AssocError::Timeout),
                Err(WaitAborted::Cancelled) => Err(AssocError::Cancelled),
            }
        } else {
            self.outcomes
                .pop_front()
                .unwrap_or_else(|| self.default.clone())
        };
        self.connected = outcome.is_ok() || (self.keep_link && self.connected);
        outcome
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ==================== Store ====================

/// Credential store holding the encoded record in memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Option<Vec<u8>>,
    fail_writes: bool,
    saves: usize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `credential`.
    pub fn with_credential(credential: &Credential) -> Self {
        Self {
            record: Some(encode_record(credential)),
            ..Default::default()
        }
    }

    /// Store holding arbitrary raw bytes.
    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            record: Some(bytes.into()),
            ..Default::default()
        }
    }

    /// Make every save fail.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Credential currently stored, decoded.
    pub fn stored(&self) -> Option<Credential> {
        self.record.as_deref().and_then(|r| decode_record(r).ok())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_record(&self) -> Result<Option<Credential>, StoreError> {
        self.record.as_deref().map(decode_record).transpose()
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::WriteFailed("storage full".into()));
        }
        self.record = Some(encode_record(credential));
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.record = None;
        Ok(())
    }
}

// ==================== Indicator ====================

/// Indicator remembering every state it was set to.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    history: Vec<DeviceState>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `set` call, in order.
    pub fn history(&self) -> &[DeviceState] {
        &self.history
    }

    pub fn current(&self) -> Option<DeviceState> {
        self.history.last().copied()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn set(&mut self, state: DeviceState) {
        self.history.push(state);
    }
}
