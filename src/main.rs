//! Lakshya - camera-guided robot car controller
//!
//! ```text
//! lakshya [--config lakshya.toml] [--detector aruco|color] [--camera-url URL]
//!         [--send-interval-ms N] [--no-input]
//! ```
//!
//! Without a config file the documented defaults are used. `RUST_LOG`
//! overrides the default `lakshya=info` filter.

use clap::Parser;
use crossbeam_channel::unbounded;
use lakshya::config::LakshyaConfig;
use lakshya::error::{LakshyaError, Result};
use lakshya::input::{RawModeGuard, spawn_input_thread};
use lakshya::orchestrator::{OperatorEvent, Orchestrator};
use lakshya::shared::SharedState;
use lakshya::stream::MjpegStream;
use lakshya::transmit::{CommandSink, SimulatedSink};
use lakshya::vision::{
    ColorDetector, DetectorKind, MarkerDetector, MarkerRecognizer, NullRecognizer,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lakshya", version, about = "Camera-guided target tracking for a robot car")]
struct Args {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "lakshya.toml")]
    config: PathBuf,

    /// Detector active at startup
    #[arg(short, long, value_enum)]
    detector: Option<DetectorKind>,

    /// MJPEG stream URL or recorded file path
    #[arg(long)]
    camera_url: Option<String>,

    /// Transmitter cadence in milliseconds
    #[arg(long)]
    send_interval_ms: Option<u64>,

    /// Run without keyboard control (quit with Ctrl-C)
    #[arg(long)]
    no_input: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Raw terminal mode needs explicit carriage returns
    let crlf = !args.no_input;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lakshya=info".parse().expect("static directive")),
        )
        .with_writer(move || CrlfWriter {
            inner: io::stderr(),
            crlf,
        })
        .init();

    info!("Lakshya v{}", env!("CARGO_PKG_VERSION"));

    let mut config = LakshyaConfig::load_or_default(&args.config)?;
    if let Some(detector) = args.detector {
        info!("Using detector: {}", detector);
        config.navigation.detector = detector;
    }
    if let Some(url) = args.camera_url {
        info!("Using camera: {}", url);
        config.camera.url = url;
    }
    if let Some(ms) = args.send_interval_ms {
        config.ble.send_interval_ms = ms;
    }
    config.validate()?;

    let shared = Arc::new(SharedState::new());
    let (event_tx, event_rx) = unbounded();

    {
        let shared = Arc::clone(&shared);
        let tx = event_tx.clone();
        ctrlc::set_handler(move || {
            shared.signal_shutdown();
            let _ = tx.send(OperatorEvent::Quit);
        })
        .map_err(|e| LakshyaError::Terminal(format!("Ctrl-C handler: {}", e)))?;
    }

    let marker = MarkerDetector::from_config(build_recognizer(&config)?, &config.aruco);
    let color = ColorDetector::from_config(&config.color_tracking);
    let mut sink: Box<dyn CommandSink> = Box::new(SimulatedSink::new(&config.ble.device_name));

    let stream = match MjpegStream::from_config(&config.camera) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Cannot open camera: {}", e);
            sink.disconnect();
            return Err(e);
        }
    };

    let (raw_mode, input_thread) = if args.no_input {
        (None, None)
    } else {
        let guard = RawModeGuard::enable()?;
        print_controls();
        let handle = spawn_input_thread(event_tx.clone(), Arc::clone(&shared))?;
        (Some(guard), Some(handle))
    };

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&shared),
        stream,
        marker,
        color,
        sink,
        event_rx,
    )?;
    let result = orchestrator.run();

    shared.signal_shutdown();
    if let Some(handle) = input_thread
        && handle.join().is_err()
    {
        error!("Input thread panicked");
    }
    drop(raw_mode);

    let stats = result?;
    info!(
        "Lakshya finished ({} frames, {} with target)",
        stats.frames, stats.frames_with_detection
    );
    Ok(())
}

#[cfg(feature = "opencv")]
fn build_recognizer(config: &LakshyaConfig) -> Result<Box<dyn MarkerRecognizer>> {
    let dictionary = config.aruco.marker_dictionary()?;
    match lakshya::vision::OpenCvArucoRecognizer::new(dictionary) {
        Ok(recognizer) => Ok(Box::new(recognizer)),
        Err(e) => {
            warn!("OpenCV ArUco unavailable ({}), markers will never be detected", e);
            Ok(Box::new(NullRecognizer))
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn build_recognizer(config: &LakshyaConfig) -> Result<Box<dyn MarkerRecognizer>> {
    if config.navigation.detector == DetectorKind::Aruco {
        warn!(
            "Built without the `opencv` feature: {} markers will never be detected",
            config.aruco.dictionary
        );
    }
    Ok(Box::new(NullRecognizer))
}

fn print_controls() {
    info!("Controls:");
    info!("  p       pause / resume autonomous");
    info!("  m       toggle manual override");
    info!("  w / s   manual throttle");
    info!("  a / d   manual steering");
    info!("  [ / ]   manual omega");
    info!("  space   emergency stop");
    info!("  t       switch detector");
    info!("  c       recalibrate colour from frame centre");
    info!("  q       quit");
}

/// stderr writer that emits `\r\n` line endings while the terminal is raw
struct CrlfWriter {
    inner: io::Stderr,
    crlf: bool,
}

impl Write for CrlfWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.crlf {
            return self.inner.write(buf);
        }
        let mut start = 0;
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
