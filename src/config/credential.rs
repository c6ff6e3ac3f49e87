//! Wi-Fi credential type.
//!
//! A [`Credential`] is the validated (ssid, password) pair that flows from the
//! BLE parser into the associator and the persistent store. Construction
//! always validates, so holding a `Credential` means the invariants hold.
//!
//! # Example
//!
//! ```
//! use ble_wifi_provisioner::config::Credential;
//!
//! let credential = Credential::new("MyNet", "Secr3t!").unwrap();
//! assert_eq!(credential.ssid(), "MyNet");
//! assert!(Credential::new("", "pw").is_err());
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Field separator and frame terminator of the provisioning protocol.
pub(crate) const FIELD_SEPARATOR: char = ';';

/// Key/value separator of the provisioning protocol.
pub(crate) const KEY_VALUE_SEPARATOR: char = '=';

/// Wi-Fi credentials for joining an access point.
///
/// The password is zeroed when the credential is dropped and is never
/// included in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    ssid: String,
    password: String,
}

impl Credential {
    /// Create a validated credential.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let credential = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Network SSID (1-32 bytes, no `=` or `;`).
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Network password (1-64 bytes, no `;`).
    pub fn password(&self) -> &str {
        &self.password
    }

    fn validate(&self) -> Result<(), CredentialError> {
        if self.ssid.is_empty() {
            return Err(CredentialError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(CredentialError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if let Some(c) = self
            .ssid
            .chars()
            .find(|&c| c == FIELD_SEPARATOR || c == KEY_VALUE_SEPARATOR)
        {
            return Err(CredentialError::ForbiddenCharacter { field: "ssid", c });
        }

        if self.password.is_empty() {
            return Err(CredentialError::PasswordEmpty);
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(CredentialError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        if self.password.contains(FIELD_SEPARATOR) {
            return Err(CredentialError::ForbiddenCharacter {
                field: "password",
                c: FIELD_SEPARATOR,
            });
        }

        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reasons a credential fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is empty.
    PasswordEmpty,
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// A protocol delimiter appears inside a field.
    ForbiddenCharacter { field: &'static str, c: char },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordEmpty => write!(f, "password cannot be empty"),
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::ForbiddenCharacter { field, c } => {
                write!(f, "{} contains forbidden character '{}'", field, c)
            }
        }
    }
}

impl std::error::Error for CredentialError {}
