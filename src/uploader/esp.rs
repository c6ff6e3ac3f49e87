//! On-chip sensor and HTTPS client for the ESP32 uploader.

use super::{FeedClient, TemperatureSource, UploadError};
use embedded_svc::http::client::Client;
use embedded_svc::io::Write;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::temp_sensor::{TempSensor, TempSensorConfig, TempSensorDriver};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use esp_idf_sys::EspError;
use std::time::Duration;

/// Upper bound on one request, connect included.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The die temperature sensor. Reads a few degrees above ambient.
pub struct ChipTemperature {
    driver: TempSensorDriver<'static>,
}

impl ChipTemperature {
    pub fn new(sensor: impl Peripheral<P = TempSensor> + 'static) -> Result<Self, EspError> {
        let mut driver = TempSensorDriver::new(&TempSensorConfig::default(), sensor)?;
        driver.enable()?;
        Ok(Self { driver })
    }
}

impl TemperatureSource for ChipTemperature {
    fn read_celsius(&mut self) -> Result<f32, UploadError> {
        self.driver
            .get_celsius()
            .map_err(|e| UploadError::Sensor(format!("{:?}", e)))
    }
}

/// HTTPS client verifying servers against the built-in CA bundle.
///
/// A connection is opened per request; uploads are seconds apart.
#[derive(Debug, Default)]
pub struct EspFeedClient;

impl EspFeedClient {
    pub fn new() -> Self {
        Self
    }
}

impl FeedClient for EspFeedClient {
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<u16, UploadError> {
        let config = Configuration {
            timeout: Some(HTTP_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut client = Client::wrap(EspHttpConnection::new(&config).map_err(http_error)?);

        let content_length = body.len().to_string();
        let mut all_headers: Vec<(&str, &str)> = headers.to_vec();
        all_headers.push(("Content-Length", content_length.as_str()));

        let mut request = client.post(url, &all_headers).map_err(http_error)?;
        request.write_all(body).map_err(http_error)?;
        request.flush().map_err(http_error)?;
        let response = request.submit().map_err(http_error)?;
        Ok(response.status())
    }
}

fn http_error(e: impl std::fmt::Debug) -> UploadError {
    UploadError::Http(format!("{:?}", e))
}
