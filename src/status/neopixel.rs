//! Single WS2812 status LED driven by the RMT peripheral.
//!
//! On the QT Py ESP32-S3 the pixel's data line is GPIO39 and its supply is
//! switched by GPIO38, which must be driven high before the LED responds.

use super::{DeviceState, Rgb, StatusIndicator};
use esp_idf_hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::rmt::config::TransmitConfig;
use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, RmtChannel, TxRmtDriver};
use esp_idf_sys::EspError;
use log::{debug, warn};
use std::time::Duration;

/// Default brightness; full-scale WS2812 output is uncomfortably bright.
pub const DEFAULT_BRIGHTNESS: f32 = 0.3;

// WS2812 bit timings
const T0H: Duration = Duration::from_nanos(350);
const T0L: Duration = Duration::from_nanos(800);
const T1H: Duration = Duration::from_nanos(700);
const T1L: Duration = Duration::from_nanos(600);

/// WS2812 status pixel.
pub struct NeoPixel {
    tx: TxRmtDriver<'static>,
    /// Held high for the lifetime of the driver.
    _power: Option<PinDriver<'static, AnyOutputPin, Output>>,
    brightness: f32,
    /// Last color written, to skip redundant writes.
    shown: Option<Rgb>,
}

impl NeoPixel {
    /// Set up the RMT channel on `data`, powering the pixel through `power` if given.
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        data: impl Peripheral<P = impl OutputPin> + 'static,
        power: Option<AnyOutputPin>,
    ) -> Result<Self, EspError> {
        let power = match power {
            Some(pin) => {
                let mut driver = PinDriver::output(pin)?;
                driver.set_high()?;
                Some(driver)
            }
            None => None,
        };

        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, data, &config)?;

        Ok(Self {
            tx,
            _power: power,
            brightness: DEFAULT_BRIGHTNESS,
            shown: None,
        })
    }

    /// Write a color to the pixel unless it is already showing.
    pub fn show(&mut self, color: Rgb) -> Result<(), EspError> {
        let color = color.scaled(self.brightness);
        if self.shown == Some(color) {
            return Ok(());
        }

        let ticks_hz = self.tx.counter_clock()?;
        let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &T0H)?;
        let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &T0L)?;
        let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &T1H)?;
        let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &T1L)?;

        let grb = color.to_grb();
        let mut signal = FixedLengthSignal::<24>::new();
        for i in 0..24 {
            let bit = (grb >> (23 - i)) & 1 == 1;
            let pulses = if bit { (t1h, t1l) } else { (t0h, t0l) };
            signal.set(i, &pulses)?;
        }
        self.tx.start_blocking(&signal)?;

        self.shown = Some(color);
        Ok(())
    }
}

impl StatusIndicator for NeoPixel {
    fn set(&mut self, state: DeviceState) {
        debug!("LED -> {}", state);
        if let Err(e) = self.show(state.color()) {
            warn!("Failed to update status LED: {:?}", e);
        }
    }
}
