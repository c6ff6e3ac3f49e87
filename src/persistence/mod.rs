//! Credential persistence.
//!
//! Exactly one credential is stored, overwritten in full on every save. Stores
//! keep no cache: every load and save touches the medium.
//!
//! # Record Format
//!
//! ```text
//! [version:1][ssid_len:1][ssid][pwd_len:1][pwd]
//! ```
//!
//! Anything that does not decode to a valid [`Credential`] is treated as
//! corrupt, and [`CredentialStore::load`] reports it as "no credential".
//!
//! # Backends
//!
//! - [`nvs`] - ESP32 NVS blob (ESP32 only)
//! - [`host`] - file under the user's home directory

#[cfg(not(feature = "esp32"))]
mod host;
#[cfg(feature = "esp32")]
mod nvs;

#[cfg(not(feature = "esp32"))]
pub use host::{default_credential_path, FileCredentialStore};
#[cfg(feature = "esp32")]
pub use nvs::NvsCredentialStore;

use crate::config::{Credential, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use log::{debug, warn};
use std::fmt;

/// Current record version byte.
pub const RECORD_VERSION: u8 = 1;

/// Largest valid record.
pub const MAX_RECORD_LEN: usize = 1 + 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN;

/// Durable storage for a single credential.
pub trait CredentialStore {
    /// Read the stored record.
    ///
    /// `Ok(None)` when nothing is stored, `Err(ReadCorrupt)` when the record
    /// exists but cannot be decoded.
    fn load_record(&self) -> Result<Option<Credential>, StoreError>;

    /// Replace the stored record.
    fn save(&mut self, credential: &Credential) -> Result<(), StoreError>;

    /// Remove the stored record. Clearing an empty store is not an error.
    fn clear(&mut self) -> Result<(), StoreError>;

    /// Saved credential, if a readable one exists.
    fn load(&self) -> Option<Credential> {
        match self.load_record() {
            Ok(Some(credential)) => Some(credential),
            Ok(None) => {
                debug!("No saved credential");
                None
            }
            Err(e) => {
                warn!("Ignoring saved credential: {}", e);
                None
            }
        }
    }
}

/// Serialize a credential into a record.
pub fn encode_record(credential: &Credential) -> Vec<u8> {
    let ssid = credential.ssid().as_bytes();
    let password = credential.password().as_bytes();

    let mut bytes = Vec::with_capacity(3 + ssid.len() + password.len());
    bytes.push(RECORD_VERSION);
    // Lengths fit in a byte: Credential enforces the 802.11 limits.
    bytes.push(ssid.len() as u8);
    bytes.extend_from_slice(ssid);
    bytes.push(password.len() as u8);
    bytes.extend_from_slice(password);
    bytes
}

/// Deserialize a record.
pub fn decode_record(bytes: &[u8]) -> Result<Credential, StoreError> {
    let corrupt = |what: &str| StoreError::ReadCorrupt(what.to_string());

    let (&version, rest) = bytes.split_first().ok_or_else(|| corrupt("empty record"))?;
    if version != RECORD_VERSION {
        return Err(StoreError::ReadCorrupt(format!(
            "unsupported record version {}",
            version
        )));
    }

    let (ssid, rest) = take_field(rest).ok_or_else(|| corrupt("truncated SSID"))?;
    let (password, rest) = take_field(rest).ok_or_else(|| corrupt("truncated password"))?;
    if !rest.is_empty() {
        return Err(StoreError::ReadCorrupt(format!(
            "{} trailing bytes",
            rest.len()
        )));
    }

    let ssid = String::from_utf8(ssid.to_vec()).map_err(|_| corrupt("invalid SSID UTF-8"))?;
    let password =
        String::from_utf8(password.to_vec()).map_err(|_| corrupt("invalid password UTF-8"))?;

    Credential::new(ssid, password).map_err(|e| StoreError::ReadCorrupt(e.to_string()))
}

/// Split a length-prefixed field off the front of `bytes`.
fn take_field(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&len, rest) = bytes.split_first()?;
    let len = len as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

/// Persistence failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record could not be written (or did not verify after writing).
    WriteFailed(String),
    /// The stored record is unreadable or invalid.
    ReadCorrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed(e) => write!(f, "credential write failed: {}", e),
            Self::ReadCorrupt(e) => write!(f, "stored credential is corrupt: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}
