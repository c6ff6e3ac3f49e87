//! Provisioning message parser.
//!
//! A message is the body of one frame (terminator already stripped):
//!
//! ```text
//! message := field (";" field)*
//! field   := key "=" value
//! ```
//!
//! Recognised keys are `ssid` and `pwd`; anything else is ignored so newer
//! centrals can send extra fields. Keys and values are trimmed, fields without
//! `=` are skipped, and when a key repeats the last occurrence wins. There is
//! no escaping: a value cannot contain `;`.
//!
//! # Example
//!
//! ```
//! use ble_wifi_provisioner::config::{parse, ParseError};
//!
//! let credential = parse("pwd=hunter2;ssid=Home").unwrap();
//! assert_eq!(credential.ssid(), "Home");
//! assert_eq!(parse("ssid=Home"), Err(ParseError::MissingFields));
//! ```

use super::credential::{Credential, CredentialError, FIELD_SEPARATOR, KEY_VALUE_SEPARATOR};
use std::fmt;
use zeroize::Zeroize;

/// Key carrying the network name.
pub const SSID_KEY: &str = "ssid";

/// Key carrying the network password.
pub const PASSWORD_KEY: &str = "pwd";

/// Recognised fields of a message, before completeness is checked.
#[derive(Default, Clone, PartialEq, Eq, Zeroize)]
pub struct CredentialFields {
    pub ssid: Option<String>,
    pub password: Option<String>,
}

impl CredentialFields {
    /// True when neither recognised key was present.
    pub fn is_empty(&self) -> bool {
        self.ssid.is_none() && self.password.is_none()
    }

    /// Overlay `newer` on top of these fields; present values replace old ones.
    pub fn merge(&mut self, newer: CredentialFields) {
        let mut newer = newer;
        if let Some(ssid) = newer.ssid.take() {
            self.ssid = Some(ssid);
        }
        if let Some(password) = newer.password.take() {
            if let Some(old) = self.password.as_mut() {
                old.zeroize();
            }
            self.password = Some(password);
        }
    }

    /// Turn the fields into a credential if both are present and non-empty.
    pub fn to_credential(&self) -> Result<Credential, ParseError> {
        match (self.ssid.as_deref(), self.password.as_deref()) {
            (Some(ssid), Some(password)) if !ssid.is_empty() && !password.is_empty() => {
                Ok(Credential::new(ssid, password)?)
            }
            _ => Err(ParseError::MissingFields),
        }
    }
}

impl fmt::Debug for CredentialFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFields")
            .field("ssid", &self.ssid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Extract the recognised fields of a message without requiring both.
pub fn parse_fields(message: &str) -> CredentialFields {
    let mut fields = CredentialFields::default();

    for part in message.split(FIELD_SEPARATOR) {
        let Some((key, value)) = part.split_once(KEY_VALUE_SEPARATOR) else {
            continue;
        };
        match key.trim() {
            SSID_KEY => fields.ssid = Some(value.trim().to_string()),
            PASSWORD_KEY => fields.password = Some(value.trim().to_string()),
            _ => {}
        }
    }

    fields
}

/// Parse a complete message into a validated credential.
pub fn parse(message: &str) -> Result<Credential, ParseError> {
    if message.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    parse_fields(message).to_credential()
}

/// Reasons a message does not yield a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The message body was empty.
    Empty,
    /// `ssid` or `pwd` is absent or has an empty value.
    MissingFields,
    /// Both fields were present but violate credential limits.
    InvalidCredential(CredentialError),
}

impl From<CredentialError> for ParseError {
    fn from(e: CredentialError) -> Self {
        Self::InvalidCredential(e)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty message"),
            Self::MissingFields => write!(f, "expected 'ssid=...;pwd=...;'"),
            Self::InvalidCredential(e) => write!(f, "invalid credential: {}", e),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidCredential(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== parse Tests ====================

    #[test]
    fn test_parse_valid() {
        let credential = parse("ssid=A;pwd=B;").unwrap();
        assert_eq!(credential, Credential::new("A", "B").unwrap());
    }

    #[test]
    fn test_parse_without_trailing_separator() {
        let credential = parse("ssid=TestNetwork;pwd=12345678").unwrap();
        assert_eq!(credential.ssid(), "TestNetwork");
        assert_eq!(credential.password(), "12345678");
    }

    #[test]
    fn test_parse_order_independent() {
        assert_eq!(parse("pwd=B;ssid=A;"), parse("ssid=A;pwd=B;"));
    }

    #[test]
    fn test_parse_missing_password() {
        assert_eq!(parse("ssid=A;"), Err(ParseError::MissingFields));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_invalid_format() {
        assert_eq!(parse("invalid_data"), Err(ParseError::MissingFields));
    }

    #[test]
    fn test_parse_empty_values() {
        assert_eq!(parse("ssid=;pwd=B"), Err(ParseError::MissingFields));
        assert_eq!(parse("ssid=A;pwd=  "), Err(ParseError::MissingFields));
    }

    #[test]
    fn test_parse_trims_keys_and_values() {
        let credential = parse("  ssid = Home Net ; pwd =  hunter2 ").unwrap();
        assert_eq!(credential.ssid(), "Home Net");
        assert_eq!(credential.password(), "hunter2");
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let credential = parse("v=2;ssid=A;channel=6;pwd=B").unwrap();
        assert_eq!(credential.ssid(), "A");
    }

    #[test]
    fn test_parse_last_duplicate_wins() {
        let credential = parse("ssid=First;pwd=one;ssid=Second").unwrap();
        assert_eq!(credential.ssid(), "Second");
        assert_eq!(credential.password(), "one");
    }

    #[test]
    fn test_parse_splits_on_first_equals() {
        let credential = parse("ssid=Net;pwd=a=b=c").unwrap();
        assert_eq!(credential.password(), "a=b=c");
    }

    #[test]
    fn test_parse_ssid_with_equals_rejected() {
        assert!(matches!(
            parse("ssid=a=b;pwd=x"),
            Err(ParseError::InvalidCredential(CredentialError::ForbiddenCharacter { .. }))
        ));
    }

    #[test]
    fn test_parse_too_long_ssid() {
        let message = format!("ssid={};pwd=x", "s".repeat(40));
        assert!(matches!(
            parse(&message),
            Err(ParseError::InvalidCredential(CredentialError::SsidTooLong { .. }))
        ));
    }

    // ==================== CredentialFields Tests ====================

    #[test]
    fn test_parse_fields_partial() {
        let fields = parse_fields("ssid=Home");
        assert_eq!(fields.ssid.as_deref(), Some("Home"));
        assert!(fields.password.is_none());
        assert!(!fields.is_empty());
        assert!(parse_fields("foo=bar").is_empty());
    }

    #[test]
    fn test_merge_completes_credential() {
        let mut pending = parse_fields("ssid=Home");
        assert_eq!(pending.to_credential(), Err(ParseError::MissingFields));

        pending.merge(parse_fields("pwd=hunter2"));
        let credential = pending.to_credential().unwrap();
        assert_eq!(credential.ssid(), "Home");
        assert_eq!(credential.password(), "hunter2");
    }

    #[test]
    fn test_merge_newer_replaces() {
        let mut pending = parse_fields("ssid=Old;pwd=old");
        pending.merge(parse_fields("ssid=New"));
        assert_eq!(pending.ssid.as_deref(), Some("New"));
        assert_eq!(pending.password.as_deref(), Some("old"));
    }

    #[test]
    fn test_fields_debug_redacts_password() {
        let debug = format!("{:?}", parse_fields("ssid=A;pwd=secret"));
        assert!(!debug.contains("secret"));
    }
}
