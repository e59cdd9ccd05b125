//! Test utilities for Lakshya integration tests.
//!
//! Synthetic JPEG frames, MJPEG stream builders, a scripted marker recognizer
//! and an orchestrator harness wired to in-memory transport and sink.

#![allow(dead_code)]

use crossbeam_channel::{Sender, unbounded};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use lakshya::config::LakshyaConfig;
use lakshya::error::Result;
use lakshya::orchestrator::{OperatorEvent, Orchestrator};
use lakshya::shared::SharedState;
use lakshya::stream::{Frame, MjpegStream, MockTransport};
use lakshya::transmit::RecordingSink;
use lakshya::vision::{
    ColorDetector, MarkerDetection, MarkerDetector, MarkerRecognizer,
};
use std::sync::Arc;

pub const BOUNDARY: &str = "lakshyaframe";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=--lakshyaframe";

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub const GREY: Rgb<u8> = Rgb([90, 90, 90]);
pub const RED: Rgb<u8> = Rgb([220, 20, 20]);

/// Encode an image as JPEG.
pub fn encode_jpeg(img: &RgbImage) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(img)
        .expect("encode synthetic frame");
    out
}

/// Uniform JPEG frame.
pub fn solid_jpeg(width: u32, height: u32, color: Rgb<u8>) -> Vec<u8> {
    encode_jpeg(&RgbImage::from_pixel(width, height, color))
}

/// Grey JPEG with a filled square of `color`.
pub fn square_jpeg(
    width: u32,
    height: u32,
    x0: u32,
    y0: u32,
    side: u32,
    color: Rgb<u8>,
) -> Vec<u8> {
    ring_jpeg(width, height, (x0, y0), side, side, color)
}

/// Grey JPEG with a square outline of `color`, `wall` pixels thick.
///
/// A wall of at least half the side gives a filled square.
pub fn ring_jpeg(
    width: u32,
    height: u32,
    origin: (u32, u32),
    side: u32,
    wall: u32,
    color: Rgb<u8>,
) -> Vec<u8> {
    let (x0, y0) = origin;
    let inside = |v: u32, start: u32| v >= start && v < start + side;
    let in_wall = |v: u32, start: u32| v < start + wall || v >= start + side - wall.min(side);
    let img = RgbImage::from_fn(width, height, |x, y| {
        if inside(x, x0) && inside(y, y0) && (in_wall(x, x0) || in_wall(y, y0)) {
            color
        } else {
            GREY
        }
    });
    encode_jpeg(&img)
}

/// Multipart body: each frame preceded by a boundary and part headers,
/// closed with a terminating boundary.
pub fn multipart_stream(boundary: &str, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for jpeg in frames {
        out.extend_from_slice(
            format!(
                "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                boundary,
                jpeg.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(jpeg);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    out
}

/// Frames back to back with no headers.
pub fn raw_stream(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.concat()
}

/// Axis-aligned square marker quadrilateral.
pub fn square_marker(id: i32, cx: f32, cy: f32, side: f32) -> MarkerDetection {
    let h = side / 2.0;
    MarkerDetection::new(
        id,
        [
            [cx - h, cy - h],
            [cx + h, cy - h],
            [cx + h, cy + h],
            [cx - h, cy + h],
        ],
    )
}

/// Recognizer that reports the same markers on every frame.
#[derive(Clone)]
pub struct ScriptedRecognizer {
    pub markers: Vec<MarkerDetection>,
}

impl MarkerRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, _frame: &Frame) -> Result<Vec<MarkerDetection>> {
        Ok(self.markers.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Defaults with fast timings for tests.
pub fn test_config() -> LakshyaConfig {
    let mut config = LakshyaConfig::default();
    config.ble.send_interval_ms = 5;
    config.ble.retry_backoff_ms = 10;
    config.ble.flush_timeout_ms = 1000;
    config.camera.reconnect_delay_ms = 1;
    config
}

/// Orchestrator wired to in-memory collaborators.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub shared: Arc<SharedState>,
    pub sink: RecordingSink,
    pub transport: MockTransport,
    pub events: Sender<OperatorEvent>,
}

/// Build a harness. `transport` must already hold at least one session.
pub fn harness(
    config: LakshyaConfig,
    transport: MockTransport,
    markers: Vec<MarkerDetection>,
) -> Harness {
    let shared = Arc::new(SharedState::new());
    let sink = RecordingSink::new();
    let (events, event_rx) = unbounded();

    let stream = MjpegStream::start(Box::new(transport.clone())).expect("mock stream opens");
    let marker = MarkerDetector::from_config(
        Box::new(ScriptedRecognizer { markers }),
        &config.aruco,
    );
    let color = ColorDetector::from_config(&config.color_tracking);

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&shared),
        stream,
        marker,
        color,
        Box::new(sink.clone()),
        event_rx,
    )
    .expect("orchestrator starts");

    Harness {
        orchestrator,
        shared,
        sink,
        transport,
        events,
    }
}
