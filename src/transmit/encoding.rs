//! Wire encoding for characteristic payloads

/// Fixed-point scale for waypoint fields
pub const WAYPOINT_SCALE: f32 = 10.0;

/// Waypoint payload length: three little-endian i16
pub const WAYPOINT_LEN: usize = 6;

/// Map a value in [-1, 1] to one byte.
///
/// `byte = round((value + 1) * 127.5)`, rounding half away from zero, then
/// clamped to 0..=255. So -1.0 -> 0, 0.0 -> 128 (127.5 rounds up), 1.0 -> 255.
/// Out-of-range input saturates; NaN maps to the neutral 128.
pub fn encode_unit(value: f32) -> u8 {
    if value.is_nan() {
        return 128;
    }
    ((value + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8
}

/// Inverse of [`encode_unit`], for logs and tests
pub fn decode_unit(byte: u8) -> f32 {
    f32::from(byte) / 127.5 - 1.0
}

/// Target pose sent on the waypoint channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    /// cm
    pub x: f32,
    /// cm
    pub y: f32,
    /// degrees
    pub rotation: f32,
}

impl Waypoint {
    pub fn new(x: f32, y: f32, rotation: f32) -> Self {
        Self { x, y, rotation }
    }

    /// Three i16 at x10 scale, little-endian: x, y, rotation.
    /// Values outside the i16 range saturate.
    pub fn encode(&self) -> [u8; WAYPOINT_LEN] {
        let mut out = [0u8; WAYPOINT_LEN];
        for (i, v) in [self.x, self.y, self.rotation].into_iter().enumerate() {
            let fixed = to_fixed(v);
            out[i * 2..i * 2 + 2].copy_from_slice(&fixed.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8; WAYPOINT_LEN]) -> Self {
        let field =
            |i: usize| f32::from(i16::from_le_bytes([bytes[i], bytes[i + 1]])) / WAYPOINT_SCALE;
        Self::new(field(0), field(2), field(4))
    }
}

fn to_fixed(v: f32) -> i16 {
    // `as` saturates and maps NaN to 0
    (v * WAYPOINT_SCALE).round() as i16
}
