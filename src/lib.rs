//! Lakshya - Target-tracking controller for a camera-guided robot car
//!
//! Pulls an MJPEG stream from a phone or ESP32 camera, finds a target
//! (ArUco marker or colour blob), turns its position into proportional
//! steering and banded throttle, and pushes the command over a low-energy
//! wireless link at a fixed cadence.
//!
//! ## Threads
//!
//! - **Control loop** (frame rate): extract, detect, compute, write the shared command
//! - **Transmitter** (20Hz by default): snapshot the command, send changed bytes
//! - **Stream pump**: blocking transport reads feeding the extractor
//! - **Input**: terminal keys mapped to operator events
//!
//! ## Features
//!
//! - `opencv`: ArUco recognition through OpenCV (otherwise marker mode never detects)

pub mod config;
pub mod control;
pub mod error;
pub mod input;
pub mod orchestrator;
pub mod shared;
pub mod stream;
pub mod transmit;
pub mod vision;

// Re-export commonly used types
pub use config::LakshyaConfig;
pub use error::{LakshyaError, Result};
pub use shared::{CommandState, SharedState};
