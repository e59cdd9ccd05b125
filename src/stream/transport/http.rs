//! HTTP MJPEG transport (phone IP-camera apps, ESP32-CAM `/stream`)

use super::{OpenedStream, PumpedSource, StreamTransport};
use crate::config::CameraConfig;
use crate::error::{LakshyaError, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

/// Blocking HTTP GET of a never-ending multipart response
pub struct HttpTransport {
    url: String,
    chunk_size: usize,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        // The per-request timeout bounds each body read, not the whole stream
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| LakshyaError::StreamUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            chunk_size: config.chunk_size,
            client,
        })
    }
}

impl StreamTransport for HttpTransport {
    fn open(&mut self) -> Result<OpenedStream> {
        tracing::info!("Connecting to camera stream {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| LakshyaError::StreamUnavailable(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LakshyaError::StreamUnavailable(format!(
                "{} returned HTTP {}",
                self.url, status
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        tracing::debug!(content_type = ?content_type, "Camera stream opened");

        let source = PumpedSource::spawn(response, self.chunk_size, "mjpeg-http")?;
        Ok(OpenedStream {
            content_type,
            source: Box::new(source),
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
