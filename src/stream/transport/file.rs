//! Recorded MJPEG replay

use super::{OpenedStream, PumpedSource, StreamTransport};
use crate::error::{LakshyaError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Replays a captured `.mjpg` file.
///
/// A raw capture has no headers, so frames are found by marker scanning
/// unless a content type is supplied.
pub struct FileTransport {
    path: PathBuf,
    chunk_size: usize,
    content_type: Option<String>,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size,
            content_type: None,
        }
    }

    /// Treat the file as a multipart body with this content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl StreamTransport for FileTransport {
    fn open(&mut self) -> Result<OpenedStream> {
        let file = File::open(&self.path).map_err(|e| {
            LakshyaError::StreamUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        tracing::info!("Replaying recorded stream {}", self.path.display());

        let source = PumpedSource::spawn(BufReader::new(file), self.chunk_size, "mjpeg-file")?;
        Ok(OpenedStream {
            content_type: self.content_type.clone(),
            source: Box::new(source),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::transport::ChunkRead;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_unavailable() {
        let mut transport = FileTransport::new("/nonexistent/capture.mjpg", 1024);
        assert!(matches!(
            transport.open(),
            Err(LakshyaError::StreamUnavailable(_))
        ));
    }

    #[test]
    fn test_replays_file_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.mjpg");
        std::fs::write(&path, b"\xFF\xD8abc\xFF\xD9").unwrap();

        let mut transport = FileTransport::new(&path, 4).with_content_type("image/jpeg");
        let mut opened = transport.open().unwrap();
        assert_eq!(opened.content_type.as_deref(), Some("image/jpeg"));

        let mut bytes = Vec::new();
        while let ChunkRead::Data(chunk) = opened.source.next_chunk(Duration::from_secs(2)) {
            bytes.extend(chunk);
        }
        assert_eq!(bytes, b"\xFF\xD8abc\xFF\xD9");
    }
}
