//! Wireless command transmission
//!
//! - [`encoding`]: byte mapping for unit values and waypoint packing
//! - [`sink`]: the characteristic-write boundary and its in-process implementations
//! - [`transmitter`]: the rate-limited, send-on-change sender thread

pub mod encoding;
pub mod sink;
pub mod transmitter;

pub use encoding::{Waypoint, decode_unit, encode_unit};
pub use sink::{CommandSink, RecordedWrite, RecordingSink, SimulatedSink};
pub use transmitter::{Channels, CycleReport, Transmitter, TransmitterConfig, TransmitterHandle};
