//! Configuration loading for Lakshya
//!
//! Every field carries a serde default, so a partial TOML document fills the
//! gaps and a missing document falls back to [`LakshyaConfig::default`].

use crate::error::{LakshyaError, Result};
use crate::vision::color::HsvRange;
use crate::vision::{DetectorKind, MarkerDictionary};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LakshyaConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub aruco: ArucoConfig,
    #[serde(default)]
    pub color_tracking: ColorTrackingConfig,
    #[serde(default)]
    pub ble: BleConfig,
    #[serde(default)]
    pub manual: ManualConfig,
}

/// Video source settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CameraConfig {
    /// MJPEG stream URL, or a path to a recorded `.mjpg` file
    #[serde(default = "default_camera_url")]
    pub url: String,

    /// Connection timeout in milliseconds (default: 5000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Frame stall after which the stream is reopened (default: 10000)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Frame stall after which autonomous mode stops the car (default: 1000)
    #[serde(default = "default_stale_frame")]
    pub stale_frame_ms: u64,

    /// Bytes requested per transport read (default: 1024)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Delay before re-opening a dropped stream (default: 1000)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts after a transport error before giving up (default: 3)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

/// Steering/throttle tunables shared by both detectors
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NavigationConfig {
    /// Detector active at startup
    #[serde(default)]
    pub detector: DetectorKind,

    /// Distance to hold from a marker (cm)
    #[serde(default = "default_target_distance")]
    pub target_distance_cm: f32,

    /// Band around the target distance where throttle is zero (cm)
    #[serde(default = "default_distance_tolerance")]
    pub distance_tolerance_cm: f32,

    /// Steering magnitude limit in [0, 1]
    #[serde(default = "default_max_steering")]
    pub max_steering: f32,

    /// Proportional gain from pixel error to steering
    #[serde(default = "default_steering_kp")]
    pub steering_kp: f32,

    /// Forward throttle when the target is too far
    #[serde(default = "default_base_throttle")]
    pub base_throttle: f32,

    /// Fraction of `base_throttle` used when backing away
    #[serde(default = "default_backward_multiplier")]
    pub backward_throttle_multiplier: f32,

    /// Raw steering below this magnitude is zeroed
    #[serde(default = "default_dead_zone")]
    pub steering_dead_zone: f32,

    /// Steering is rounded to multiples of this step
    #[serde(default = "default_quantization")]
    pub steering_quantization: f32,

    /// Mirror steering while reversing
    #[serde(default = "default_true")]
    pub invert_steering_on_reverse: bool,
}

/// Fiducial marker settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ArucoConfig {
    /// Predefined dictionary name, e.g. `DICT_6X6_250`
    #[serde(default = "default_dictionary")]
    pub dictionary: String,

    /// Printed marker edge length (cm)
    #[serde(default = "default_marker_size")]
    pub marker_size_cm: f32,

    /// Camera focal length (pixels)
    #[serde(default = "default_focal_length")]
    pub focal_length_px: f32,
}

/// Colour blob tracking settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ColorTrackingConfig {
    /// Inclusive HSV lower bound (H in 0..=179)
    #[serde(default = "default_hsv_lower")]
    pub hsv_lower: [u8; 3],

    /// Inclusive HSV upper bound
    #[serde(default = "default_hsv_upper")]
    pub hsv_upper: [u8; 3],

    /// Blobs smaller than this (pixels) are ignored
    #[serde(default = "default_min_contour_area")]
    pub min_contour_area: u32,

    /// Blob area / frame area to hold
    #[serde(default = "default_target_area_ratio")]
    pub target_area_ratio: f32,

    /// Band around the target ratio where throttle is zero
    #[serde(default = "default_area_ratio_tolerance")]
    pub area_ratio_tolerance: f32,

    /// Scale on colour-mode reverse throttle; 1.0 reverses like marker mode
    #[serde(default = "default_reverse_scale")]
    pub reverse_scale: f32,
}

/// Wireless link settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BleConfig {
    /// Advertised name of the sensor hub
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,

    #[serde(default = "default_throttle_uuid")]
    pub char_throttle_uuid: Uuid,

    #[serde(default = "default_steering_uuid")]
    pub char_steering_uuid: Uuid,

    #[serde(default = "default_omega_uuid")]
    pub char_omega_uuid: Uuid,

    #[serde(default = "default_waypoint_uuid")]
    pub char_waypoint_uuid: Uuid,

    /// Transmitter cadence in milliseconds (50 = 20Hz, 250 = 4Hz)
    #[serde(default = "default_send_interval")]
    pub send_interval_ms: u64,

    /// Sleep after a failed write before the next attempt
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Upper bound on waiting for the final zero command at shutdown
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_ms: u64,
}

/// Manual drive increments
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ManualConfig {
    #[serde(default = "default_step")]
    pub throttle_step: f32,
    #[serde(default = "default_step")]
    pub steering_step: f32,
    #[serde(default = "default_step")]
    pub omega_step: f32,
}

// Default value functions
fn default_camera_url() -> String {
    "http://10.22.227.47:4747/video".to_string()
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_read_timeout() -> u64 {
    10_000
}
fn default_stale_frame() -> u64 {
    1000
}
fn default_chunk_size() -> usize {
    1024
}
fn default_reconnect_delay() -> u64 {
    1000
}
fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_target_distance() -> f32 {
    50.0
}
fn default_distance_tolerance() -> f32 {
    3.0
}
fn default_max_steering() -> f32 {
    0.6
}
fn default_steering_kp() -> f32 {
    0.003
}
fn default_base_throttle() -> f32 {
    0.3
}
fn default_backward_multiplier() -> f32 {
    0.5
}
fn default_dead_zone() -> f32 {
    0.1
}
fn default_quantization() -> f32 {
    0.05
}
fn default_true() -> bool {
    true
}

fn default_dictionary() -> String {
    "DICT_6X6_250".to_string()
}
fn default_marker_size() -> f32 {
    10.0
}
fn default_focal_length() -> f32 {
    1000.0
}

fn default_hsv_lower() -> [u8; 3] {
    [0, 100, 100]
}
fn default_hsv_upper() -> [u8; 3] {
    [10, 255, 255]
}
fn default_min_contour_area() -> u32 {
    500
}
fn default_target_area_ratio() -> f32 {
    0.05
}
fn default_area_ratio_tolerance() -> f32 {
    0.01
}
fn default_reverse_scale() -> f32 {
    1.0
}

// Characteristics share the hub's base UUID and differ in the last nibble
const BLE_BASE_UUID: u128 = 0x12345678_1234_5678_1234_56789abcdef0;

fn default_device_name() -> String {
    "BLE_Sensor_Hub".to_string()
}
fn default_service_uuid() -> Uuid {
    Uuid::from_u128(BLE_BASE_UUID)
}
fn default_throttle_uuid() -> Uuid {
    Uuid::from_u128(BLE_BASE_UUID | 0x2)
}
fn default_steering_uuid() -> Uuid {
    Uuid::from_u128(BLE_BASE_UUID | 0x3)
}
fn default_omega_uuid() -> Uuid {
    Uuid::from_u128(BLE_BASE_UUID | 0x4)
}
fn default_waypoint_uuid() -> Uuid {
    Uuid::from_u128(BLE_BASE_UUID | 0x5)
}
fn default_send_interval() -> u64 {
    50
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_flush_timeout() -> u64 {
    500
}

fn default_step() -> f32 {
    0.1
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: default_camera_url(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            stale_frame_ms: default_stale_frame(),
            chunk_size: default_chunk_size(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            target_distance_cm: default_target_distance(),
            distance_tolerance_cm: default_distance_tolerance(),
            max_steering: default_max_steering(),
            steering_kp: default_steering_kp(),
            base_throttle: default_base_throttle(),
            backward_throttle_multiplier: default_backward_multiplier(),
            steering_dead_zone: default_dead_zone(),
            steering_quantization: default_quantization(),
            invert_steering_on_reverse: default_true(),
        }
    }
}

impl Default for ArucoConfig {
    fn default() -> Self {
        Self {
            dictionary: default_dictionary(),
            marker_size_cm: default_marker_size(),
            focal_length_px: default_focal_length(),
        }
    }
}

impl Default for ColorTrackingConfig {
    fn default() -> Self {
        Self {
            hsv_lower: default_hsv_lower(),
            hsv_upper: default_hsv_upper(),
            min_contour_area: default_min_contour_area(),
            target_area_ratio: default_target_area_ratio(),
            area_ratio_tolerance: default_area_ratio_tolerance(),
            reverse_scale: default_reverse_scale(),
        }
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            service_uuid: default_service_uuid(),
            char_throttle_uuid: default_throttle_uuid(),
            char_steering_uuid: default_steering_uuid(),
            char_omega_uuid: default_omega_uuid(),
            char_waypoint_uuid: default_waypoint_uuid(),
            send_interval_ms: default_send_interval(),
            retry_backoff_ms: default_retry_backoff(),
            flush_timeout_ms: default_flush_timeout(),
        }
    }
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            throttle_step: default_step(),
            steering_step: default_step(),
            omega_step: default_step(),
        }
    }
}

impl CameraConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stale_frame(&self) -> Duration {
        Duration::from_millis(self.stale_frame_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// True when the URL names an HTTP(S) endpoint rather than a file
    pub fn is_http(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

impl ArucoConfig {
    pub fn marker_dictionary(&self) -> Result<MarkerDictionary> {
        self.dictionary.parse()
    }
}

impl ColorTrackingConfig {
    pub fn hsv_range(&self) -> HsvRange {
        HsvRange::new(self.hsv_lower, self.hsv_upper)
    }
}

impl BleConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl LakshyaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LakshyaError::Config(format!("Failed to read config file: {}", e)))?;
        let config: LakshyaConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use the documented defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            Self::load(path)
        } else {
            warn!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject tunables the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        let nav = &self.navigation;
        if !(nav.max_steering > 0.0 && nav.max_steering <= 1.0) {
            return Err(LakshyaError::Config(format!(
                "max_steering must be in (0, 1], got {}",
                nav.max_steering
            )));
        }
        if nav.steering_quantization <= 0.0 {
            return Err(LakshyaError::Config(format!(
                "steering_quantization must be positive, got {}",
                nav.steering_quantization
            )));
        }
        if nav.steering_dead_zone < 0.0 || nav.distance_tolerance_cm < 0.0 {
            return Err(LakshyaError::Config(
                "dead zone and distance tolerance must not be negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&nav.base_throttle) {
            return Err(LakshyaError::Config(format!(
                "base_throttle must be in [0, 1], got {}",
                nav.base_throttle
            )));
        }
        if self.aruco.marker_size_cm <= 0.0 || self.aruco.focal_length_px <= 0.0 {
            return Err(LakshyaError::Config(
                "marker_size_cm and focal_length_px must be positive".into(),
            ));
        }
        self.aruco.marker_dictionary()?;
        let color = &self.color_tracking;
        if color.hsv_lower.iter().zip(&color.hsv_upper).any(|(lo, hi)| lo > hi) {
            return Err(LakshyaError::Config(format!(
                "hsv_lower {:?} exceeds hsv_upper {:?}",
                color.hsv_lower, color.hsv_upper
            )));
        }
        if color.hsv_upper[0] > 179 {
            return Err(LakshyaError::Config(format!(
                "hue upper bound must be <= 179, got {}",
                color.hsv_upper[0]
            )));
        }
        if self.ble.send_interval_ms == 0 {
            return Err(LakshyaError::Config("send_interval_ms must be positive".into()));
        }
        if self.camera.chunk_size == 0 {
            return Err(LakshyaError::Config("chunk_size must be positive".into()));
        }
        Ok(())
    }
}
