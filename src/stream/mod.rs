//! MJPEG video ingest
//!
//! [`MjpegStream`] ties a [`StreamTransport`] to a [`FrameExtractor`] and
//! yields decoded [`Frame`]s. Stream end and read failures are reported as
//! [`FramePoll`] outcomes, never as errors past this boundary.

pub mod extractor;
mod frame;
pub mod transport;

pub use extractor::{ExtractorStats, FrameExtractor, parse_boundary};
pub use frame::Frame;
pub use transport::{
    ChunkRead, ChunkSource, FileTransport, HttpTransport, MockTransport, OpenedStream,
    ScriptedRead, StreamTransport,
};

use crate::config::CameraConfig;
use crate::error::Result;
use std::time::{Duration, Instant};

/// Result of waiting for one frame
#[derive(Debug)]
pub enum FramePoll {
    Frame(Frame),
    /// No complete frame within the timeout (transient)
    Timeout,
    /// Source closed cleanly
    EndOfStream,
    /// Source failed mid-stream; a reconnect may help
    TransportError(String),
}

/// Handle over an open MJPEG stream
pub struct MjpegStream {
    transport: Box<dyn StreamTransport>,
    source: Option<Box<dyn ChunkSource>>,
    extractor: FrameExtractor,
    /// Extractor counters from connections already replaced
    earlier_stats: ExtractorStats,
    frames_decoded: u64,
    decode_failures: u64,
}

impl MjpegStream {
    /// Open `transport` and parse the boundary from its content type.
    ///
    /// Fails with `StreamUnavailable` when the transport cannot be opened.
    pub fn start(mut transport: Box<dyn StreamTransport>) -> Result<Self> {
        let opened = transport.open()?;
        let extractor = FrameExtractor::from_content_type(opened.content_type.as_deref());
        log_boundary(&extractor);

        Ok(Self {
            transport,
            source: Some(opened.source),
            extractor,
            earlier_stats: ExtractorStats::default(),
            frames_decoded: 0,
            decode_failures: 0,
        })
    }

    /// Open the camera named by the configuration: HTTP(S) URLs stream over
    /// the network, anything else is replayed as a recorded file.
    pub fn from_config(config: &CameraConfig) -> Result<Self> {
        let transport: Box<dyn StreamTransport> = if config.is_http() {
            Box::new(HttpTransport::new(config)?)
        } else {
            Box::new(FileTransport::new(&config.url, config.chunk_size))
        };
        Self::start(transport)
    }

    /// Wait up to `timeout` for the next decoded frame.
    ///
    /// Complete frames already buffered are returned before the source is
    /// read again. A byte range that fails to decode is skipped.
    pub fn poll_frame(&mut self, timeout: Duration) -> FramePoll {
        let deadline = Instant::now() + timeout;

        loop {
            while let Some(jpeg) = self.extractor.extract() {
                match Frame::decode_jpeg(&jpeg) {
                    Ok(frame) => {
                        self.frames_decoded += 1;
                        return FramePoll::Frame(frame);
                    }
                    Err(e) => {
                        self.decode_failures += 1;
                        tracing::warn!("Skipping undecodable frame: {}", e);
                    }
                }
            }

            let Some(source) = self.source.as_mut() else {
                return FramePoll::EndOfStream;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return FramePoll::Timeout;
            }

            match source.next_chunk(remaining) {
                ChunkRead::Data(chunk) => {
                    tracing::trace!(bytes = chunk.len(), "Chunk received");
                    self.extractor.push(&chunk);
                }
                ChunkRead::Timeout => return FramePoll::Timeout,
                ChunkRead::End => return FramePoll::EndOfStream,
                ChunkRead::Error(e) => return FramePoll::TransportError(e),
            }
        }
    }

    /// Next decoded frame, or `None` on timeout, end of stream or read failure.
    pub fn next_frame(&mut self, timeout: Duration) -> Option<Frame> {
        match self.poll_frame(timeout) {
            FramePoll::Frame(frame) => Some(frame),
            FramePoll::Timeout => {
                tracing::debug!("No frame within {:?}", timeout);
                None
            }
            FramePoll::EndOfStream => None,
            FramePoll::TransportError(e) => {
                tracing::warn!("Stream read failed: {}", e);
                None
            }
        }
    }

    /// Drop the current connection and buffered bytes, then open again.
    pub fn reconnect(&mut self) -> Result<()> {
        self.release_source();
        self.earlier_stats.merge(self.extractor.stats());
        self.extractor = FrameExtractor::from_content_type(None);
        let opened = self.transport.open()?;
        self.extractor = FrameExtractor::from_content_type(opened.content_type.as_deref());
        log_boundary(&self.extractor);
        self.source = Some(opened.source);
        Ok(())
    }

    /// Release the transport and clear buffered state. Idempotent.
    pub fn stop(&mut self) {
        if self.source.is_some() {
            tracing::info!("Closing camera stream {}", self.transport.describe());
        }
        self.release_source();
    }

    pub fn is_stopped(&self) -> bool {
        self.source.is_none()
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Extractor counters summed over every connection
    pub fn extractor_stats(&self) -> ExtractorStats {
        let mut stats = self.earlier_stats;
        stats.merge(self.extractor.stats());
        stats
    }

    /// Bytes waiting in the extractor
    pub fn buffered(&self) -> usize {
        self.extractor.buffered()
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.extractor.clear();
    }
}

impl Drop for MjpegStream {
    fn drop(&mut self) {
        self.release_source();
    }
}

fn log_boundary(extractor: &FrameExtractor) {
    match extractor.boundary() {
        Some(b) => tracing::info!("Multipart boundary: {}", String::from_utf8_lossy(b)),
        None => tracing::info!("No multipart boundary declared, scanning for JPEG markers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 120, 200]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 85)
            .encode_image(&img)
            .unwrap();
        out
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_start_unavailable() {
        let transport = MockTransport::new();
        assert!(matches!(
            MjpegStream::start(Box::new(transport)),
            Err(crate::error::LakshyaError::StreamUnavailable(_))
        ));
    }

    #[test]
    fn test_decode_failure_is_skipped() {
        let mut bytes = vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];
        bytes.extend(jpeg(16, 16));

        let transport = MockTransport::new();
        transport.push_bytes(None, &bytes, 64);
        let mut stream = MjpegStream::start(Box::new(transport)).unwrap();

        let frame = stream.next_frame(TIMEOUT).expect("valid frame after garbage");
        assert_eq!(frame.width(), 16);
        assert_eq!(stream.decode_failures(), 1);
        assert!(stream.next_frame(TIMEOUT).is_none());
    }

    #[test]
    fn test_timeout_and_transport_error_outcomes() {
        let transport = MockTransport::new();
        transport.push_session(
            None,
            vec![
                ScriptedRead::Stall,
                ScriptedRead::Error("connection reset".into()),
            ],
        );
        let mut stream = MjpegStream::start(Box::new(transport)).unwrap();

        assert!(matches!(stream.poll_frame(TIMEOUT), FramePoll::Timeout));
        assert!(matches!(
            stream.poll_frame(TIMEOUT),
            FramePoll::TransportError(_)
        ));
    }

    #[test]
    fn test_reconnect_opens_next_session() {
        let transport = MockTransport::new();
        transport.push_session(None, vec![ScriptedRead::Error("dropped".into())]);
        transport.push_bytes(None, &jpeg(8, 8), 32);
        let probe = transport.clone();

        let mut stream = MjpegStream::start(Box::new(transport)).unwrap();
        assert!(matches!(
            stream.poll_frame(TIMEOUT),
            FramePoll::TransportError(_)
        ));

        stream.reconnect().unwrap();
        assert_eq!(probe.open_count(), 2);
        assert!(stream.next_frame(TIMEOUT).is_some());

        // No session left
        assert!(stream.reconnect().is_err());
    }

    #[test]
    fn test_extractor_stats_survive_reconnect() {
        let transport = MockTransport::new();
        transport.push_bytes(None, &jpeg(8, 8), 32);
        transport.push_bytes(None, &jpeg(8, 8), 32);
        transport.push_session(None, Vec::new());

        let mut stream = MjpegStream::start(Box::new(transport)).unwrap();
        assert!(stream.next_frame(TIMEOUT).is_some());
        stream.reconnect().unwrap();
        assert!(stream.next_frame(TIMEOUT).is_some());
        assert_eq!(stream.extractor_stats().scanned_frames, 2);

        // A failed reopen does not count the same connection twice
        stream.reconnect().unwrap();
        assert!(stream.reconnect().is_err());
        assert_eq!(stream.extractor_stats().scanned_frames, 2);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let transport = MockTransport::new();
        transport.push_bytes(None, &jpeg(8, 8), 4);
        let mut stream = MjpegStream::start(Box::new(transport)).unwrap();

        stream.poll_frame(Duration::ZERO);
        stream.stop();
        stream.stop();
        assert!(stream.is_stopped());
        assert_eq!(stream.buffered(), 0);
        assert!(matches!(stream.poll_frame(TIMEOUT), FramePoll::EndOfStream));
    }
}
