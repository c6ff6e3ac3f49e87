//! Device state and its projection onto the RGB status LED.
//!
//! | State        | Color         |
//! |--------------|---------------|
//! | Boot         | yellow        |
//! | Idle         | red           |
//! | BleConnected | blue          |
//! | Connecting   | orange        |
//! | Success      | green         |
//! | Error        | magenta       |
//!
//! Names that do not match a state map to [`Rgb::NEUTRAL`].

#[cfg(feature = "esp32")]
mod neopixel;

#[cfg(feature = "esp32")]
pub use neopixel::NeoPixel;

use log::info;
use std::fmt;

/// Provisioning state shown to the user. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Starting up, before any connection attempt.
    Boot,
    /// Advertising, waiting for a BLE central.
    Idle,
    /// A central is connected.
    BleConnected,
    /// Associating with a Wi-Fi network.
    Connecting,
    /// Associated.
    Success,
    /// Last association attempt failed.
    Error,
}

impl DeviceState {
    /// Every state, in lifecycle order.
    pub const ALL: [DeviceState; 6] = [
        Self::Boot,
        Self::Idle,
        Self::BleConnected,
        Self::Connecting,
        Self::Success,
        Self::Error,
    ];

    /// Fixed LED color of this state.
    pub fn color(self) -> Rgb {
        match self {
            Self::Boot => Rgb::new(255, 255, 0),
            Self::Idle => Rgb::new(255, 0, 0),
            Self::BleConnected => Rgb::new(0, 0, 255),
            Self::Connecting => Rgb::new(255, 165, 0),
            Self::Success => Rgb::new(0, 255, 0),
            Self::Error => Rgb::new(255, 0, 255),
        }
    }

    /// Short token used in logs and BLE notifications.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Idle => "idle",
            Self::BleConnected => "connected",
            Self::Connecting => "connecting",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Look a state up by its token.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Color for a state token, falling back to neutral for unknown names.
pub fn color_for_name(name: &str) -> Rgb {
    DeviceState::from_name(name)
        .map(DeviceState::color)
        .unwrap_or(Rgb::NEUTRAL)
}

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// White, shown for states without a table entry.
    pub const NEUTRAL: Rgb = Rgb::new(255, 255, 255);

    /// LED off.
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale each channel by `brightness` (clamped to 0.0..=1.0).
    pub fn scaled(self, brightness: f32) -> Self {
        let k = brightness.clamp(0.0, 1.0);
        let scale = |c: u8| (c as f32 * k).round() as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// Pack as a 24-bit GRB word, the wire order of WS2812 LEDs.
    pub fn to_grb(self) -> u32 {
        ((self.g as u32) << 16) | ((self.r as u32) << 8) | self.b as u32
    }
}

/// A visual status output. Setting the same state twice must not flicker.
pub trait StatusIndicator {
    fn set(&mut self, state: DeviceState);
}

/// Indicator for hosts without an LED: logs each color change.
#[derive(Debug, Default)]
pub struct LogIndicator {
    current: Option<DeviceState>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last state set.
    pub fn current(&self) -> Option<DeviceState> {
        self.current
    }
}

impl StatusIndicator for LogIndicator {
    fn set(&mut self, state: DeviceState) {
        if self.current == Some(state) {
            return;
        }
        self.current = Some(state);
        let c = state.color();
        info!("Status: {} (rgb {},{},{})", state, c.r, c.g, c.b);
    }
}
