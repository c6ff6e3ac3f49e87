//! Periodic temperature upload to an Adafruit IO feed.
//!
//! Runs after provisioning, next to the session: it only reads the shared
//! [`Connectivity`] flag and never touches the Wi-Fi radio itself.
//!
//! ```text
//! POST https://io.adafruit.com/api/v2/{username}/feeds/{feed}/data
//! X-AIO-Key: {key}
//! Content-Type: application/json
//!
//! {"value": 23.5}
//! ```
//!
//! A reading counts as delivered only on HTTP 200. The loop waits 5 s after
//! a delivery and 1 s after a failure.

#[cfg(feature = "esp32")]
mod esp;

#[cfg(feature = "esp32")]
pub use esp::{ChipTemperature, EspFeedClient};

use crate::shutdown::sleep_or_cancel;
use crate::wifi::Connectivity;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Feed written to when none is configured.
pub const DEFAULT_FEED: &str = "temperature";

/// Adafruit IO REST API root.
const API_ROOT: &str = "https://io.adafruit.com/api/v2";

/// Data endpoint of a feed.
pub fn feed_url(username: &str, feed_name: &str) -> String {
    format!("{}/{}/feeds/{}/data", API_ROOT, username, feed_name)
}

#[derive(Serialize)]
struct FeedValue {
    value: f32,
}

/// JSON body for one reading.
pub fn payload(celsius: f32) -> Result<String, UploadError> {
    serde_json::to_string(&FeedValue { value: celsius })
        .map_err(|e| UploadError::Encode(e.to_string()))
}

/// Adafruit IO account settings.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UploaderConfig {
    pub username: String,
    pub key: String,
    pub feed_name: String,
}

impl UploaderConfig {
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            key: key.into(),
            feed_name: DEFAULT_FEED.to_string(),
        }
    }

    /// Settings baked in at build time from `AIO_USERNAME`, `AIO_KEY` and
    /// optionally `AIO_FEED`.
    pub fn from_build_env() -> Option<Self> {
        let username = option_env!("AIO_USERNAME").filter(|s| !s.is_empty())?;
        let key = option_env!("AIO_KEY").filter(|s| !s.is_empty())?;
        let mut config = Self::new(username, key);
        if let Some(feed) = option_env!("AIO_FEED").filter(|s| !s.is_empty()) {
            config.feed_name = feed.to_string();
        }
        Some(config)
    }
}

impl fmt::Debug for UploaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderConfig")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .field("feed_name", &self.feed_name)
            .finish()
    }
}

/// A temperature sensor.
pub trait TemperatureSource {
    fn read_celsius(&mut self) -> Result<f32, UploadError>;
}

/// Minimal HTTP client: one POST, returning the status code.
pub trait FeedClient {
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<u16, UploadError>;
}

/// Reads the sensor and posts the value to the feed.
pub struct TemperatureUploader<S, C> {
    source: S,
    client: C,
    config: UploaderConfig,
    url: String,
}

impl<S: TemperatureSource, C: FeedClient> TemperatureUploader<S, C> {
    pub fn new(source: S, client: C, config: UploaderConfig) -> Self {
        let url = feed_url(&config.username, &config.feed_name);
        Self {
            source,
            client,
            config,
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Upload one reading. Returns `true` on HTTP 200.
    pub fn send(&mut self) -> bool {
        match self.try_send() {
            Ok(200) => true,
            Ok(status) => {
                warn!("Feed '{}' answered HTTP {}", self.config.feed_name, status);
                false
            }
            Err(e) => {
                warn!("Failed to upload temperature: {}", e);
                false
            }
        }
    }

    fn try_send(&mut self) -> Result<u16, UploadError> {
        let celsius = self.source.read_celsius()?;
        let body = payload(celsius)?;
        info!("Sending temperature: {:.2} °C to {}", celsius, self.config.feed_name);

        let headers = [
            ("X-AIO-Key", self.config.key.as_str()),
            ("Content-Type", "application/json"),
        ];
        let status = self.client.post(&self.url, &headers, body.as_bytes())?;
        debug!("Feed response: {}", status);
        Ok(status)
    }
}

/// Waits between uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCadence {
    pub after_success: Duration,
    pub after_failure: Duration,
}

impl Default for UploadCadence {
    fn default() -> Self {
        Self {
            after_success: Duration::from_secs(5),
            after_failure: Duration::from_secs(1),
        }
    }
}

/// Upload forever at `cadence` until `cancel` fires.
///
/// While the network is down nothing is posted and the failure interval is used.
pub fn run_upload_loop<S, C>(
    uploader: &mut TemperatureUploader<S, C>,
    connectivity: &Connectivity,
    cadence: UploadCadence,
    cancel: &CancellationToken,
) where
    S: TemperatureSource,
    C: FeedClient,
{
    info!("Uploading to {}", uploader.url());
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let delivered = if connectivity.is_up() {
            uploader.send()
        } else {
            debug!("Network down, skipping upload");
            false
        };

        let wait = if delivered {
            cadence.after_success
        } else {
            cadence.after_failure
        };
        if sleep_or_cancel(cancel, wait) {
            break;
        }
    }
    info!("Uploader stopped");
}

/// Upload failures. All are retried on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The sensor could not be read.
    Sensor(String),
    /// The request could not be encoded.
    Encode(String),
    /// Transport-level HTTP failure.
    Http(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor read failed: {}", e),
            Self::Encode(e) => write!(f, "encoding failed: {}", e),
            Self::Http(e) => write!(f, "HTTP request failed: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Result<f32, UploadError>);

    impl TemperatureSource for FixedSource {
        fn read_celsius(&mut self) -> Result<f32, UploadError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingClient {
        statuses: Vec<Result<u16, UploadError>>,
        requests: Vec<(String, Vec<(String, String)>, String)>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl FeedClient for RecordingClient {
        fn post(
            &mut self,
            url: &str,
            headers: &[(&str, &str)],
            body: &[u8],
        ) -> Result<u16, UploadError> {
            self.requests.push((
                url.to_string(),
                headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                String::from_utf8_lossy(body).into_owned(),
            ));
            if let Some((n, token)) = &self.cancel_after {
                if self.requests.len() >= *n {
                    token.cancel();
                }
            }
            if self.statuses.is_empty() {
                Ok(200)
            } else {
                self.statuses.remove(0)
            }
        }
    }

    fn config() -> UploaderConfig {
        UploaderConfig::new("alice", "aio_secret")
    }

    // ==================== Request Tests ====================

    #[test]
    fn test_feed_url() {
        assert_eq!(
            feed_url("alice", "temperature"),
            "https://io.adafruit.com/api/v2/alice/feeds/temperature/data"
        );
    }

    #[test]
    fn test_payload_is_json_value() {
        let body = payload(23.5).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["value"].as_f64(), Some(23.5));
    }

    #[test]
    fn test_send_posts_reading() {
        let mut uploader =
            TemperatureUploader::new(FixedSource(Ok(21.0)), RecordingClient::default(), config());
        assert!(uploader.send());

        let (url, headers, body) = &uploader.client().requests[0];
        assert_eq!(url, "https://io.adafruit.com/api/v2/alice/feeds/temperature/data");
        assert!(headers.contains(&("X-AIO-Key".to_string(), "aio_secret".to_string())));
        assert!(headers.contains(&("Content-Type".to_string(), "application/json".to_string())));
        assert_eq!(body, r#"{"value":21.0}"#);
    }

    #[test]
    fn test_non_200_is_failure() {
        let client = RecordingClient {
            statuses: vec![Ok(201), Ok(401), Err(UploadError::Http("reset".into()))],
            ..Default::default()
        };
        let mut uploader = TemperatureUploader::new(FixedSource(Ok(21.0)), client, config());
        assert!(!uploader.send());
        assert!(!uploader.send());
        assert!(!uploader.send());
        assert!(uploader.send());
    }

    #[test]
    fn test_sensor_failure_posts_nothing() {
        let source = FixedSource(Err(UploadError::Sensor("not enabled".into())));
        let mut uploader = TemperatureUploader::new(source, RecordingClient::default(), config());
        assert!(!uploader.send());
        assert!(uploader.client().requests.is_empty());
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let shown = format!("{:?}", config());
        assert!(shown.contains("alice"));
        assert!(!shown.contains("aio_secret"));
    }

    // ==================== Loop Tests ====================

    #[test]
    fn test_loop_uploads_until_cancelled() {
        let cancel = CancellationToken::new();
        let client = RecordingClient {
            cancel_after: Some((3, cancel.clone())),
            ..Default::default()
        };
        let mut uploader = TemperatureUploader::new(FixedSource(Ok(20.0)), client, config());
        let connectivity = Connectivity::new();
        connectivity.set(true);

        let cadence = UploadCadence {
            after_success: Duration::ZERO,
            after_failure: Duration::ZERO,
        };
        run_upload_loop(&mut uploader, &connectivity, cadence, &cancel);

        assert_eq!(uploader.client().requests.len(), 3);
    }

    #[test]
    fn test_loop_skips_while_offline() {
        let cancel = CancellationToken::new();
        let mut uploader =
            TemperatureUploader::new(FixedSource(Ok(20.0)), RecordingClient::default(), config());
        let connectivity = Connectivity::new();

        let remote = cancel.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let cadence = UploadCadence {
            after_success: Duration::from_millis(1),
            after_failure: Duration::from_millis(1),
        };
        run_upload_loop(&mut uploader, &connectivity, cadence, &cancel);
        stopper.join().unwrap();

        assert!(uploader.client().requests.is_empty());
    }

    #[test]
    fn test_default_cadence() {
        let cadence = UploadCadence::default();
        assert_eq!(cadence.after_success, Duration::from_secs(5));
        assert_eq!(cadence.after_failure, Duration::from_secs(1));
    }
}
