//! BLE provisioning link.
//!
//! This module contains the transport abstraction the provisioning session
//! talks to, and the framing that turns its byte stream into messages.
//!
//! # Components
//!
//! - [`framing`] - terminator-delimited frame reassembly (host-testable)
//! - [`uart_service`] - Nordic UART Service over NimBLE (ESP32 only)
//! - [`stdio`] - stdin-backed stand-in for development hosts

mod framing;
#[cfg(not(feature = "esp32"))]
mod stdio;
#[cfg(feature = "esp32")]
mod uart_service;

use std::fmt;

pub use framing::{FrameAssembler, FrameError, TERMINATOR};
#[cfg(not(feature = "esp32"))]
pub use stdio::StdioTransport;
#[cfg(feature = "esp32")]
pub use uart_service::UartTransport;

/// A BLE peripheral exposing a UART-style byte stream to one central.
pub trait BleTransport {
    /// Start (or restart) advertising the provisioning service.
    fn start_advertising(&mut self) -> Result<(), TransportError>;

    /// Stop advertising. Called on shutdown.
    fn stop_advertising(&mut self) -> Result<(), TransportError>;

    /// Whether a central is currently connected.
    fn is_connected(&self) -> bool;

    /// Take all bytes received since the last call. Empty when nothing arrived.
    fn read_available(&mut self) -> Vec<u8>;

    /// Send a short status notification to the connected central.
    fn notify(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// BLE stack failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BLE transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}
