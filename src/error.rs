//! Error types for Lakshya

use thiserror::Error;

/// Lakshya error type
///
/// End of stream and "no target" are not errors; they are reported through
/// [`crate::stream::FramePoll`] and [`crate::vision::TargetObservation`].
#[derive(Error, Debug)]
pub enum LakshyaError {
    /// Video source could not be opened (fatal to the session)
    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    /// Read failure in the middle of a stream (reconnect candidate)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A byte range looked like a JPEG but did not decode
    #[error("Decode failure: {0}")]
    Decode(String),

    /// Wireless characteristic write failed
    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Marker recognizer error: {0}")]
    Recognizer(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for LakshyaError {
    fn from(e: toml::de::Error) -> Self {
        LakshyaError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for LakshyaError {
    fn from(e: toml::ser::Error) -> Self {
        LakshyaError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LakshyaError>;
