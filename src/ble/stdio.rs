//! Stdin-backed stand-in for the BLE UART on development hosts.
//!
//! Each line typed on stdin arrives as one transport read (without the
//! newline), so `ssid=Home;pwd=hunter2;` behaves like a single BLE write.
//! The "central" is connected while stdin is open; EOF is a disconnect.

use super::{BleTransport, TransportError};
use log::{debug, info};
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Host transport reading provisioning bytes from stdin.
pub struct StdioTransport {
    name: String,
    lines: Receiver<Vec<u8>>,
    connected: bool,
    advertising: bool,
}

impl StdioTransport {
    /// Spawn the stdin reader thread.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line.into_bytes()).is_err() {
                        break;
                    }
                }
                debug!("stdin closed");
            })?;

        Ok(Self {
            name: name.into(),
            lines: rx,
            connected: true,
            advertising: false,
        })
    }
}

impl BleTransport for StdioTransport {
    fn start_advertising(&mut self) -> Result<(), TransportError> {
        if !self.advertising {
            info!("'{}' waiting for input on stdin", self.name);
        }
        self.advertising = true;
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        self.advertising = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read_available(&mut self) -> Vec<u8> {
        let mut bytes = Vec::new();
        loop {
            match self.lines.try_recv() {
                Ok(line) => bytes.extend_from_slice(&line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.connected = false;
                    break;
                }
            }
        }
        bytes
    }

    fn notify(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(data)
            .and_then(|_| stdout.write_all(b"\n"))
            .and_then(|_| stdout.flush())
            .map_err(|e| TransportError(e.to_string()))
    }
}
