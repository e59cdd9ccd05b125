//! Byte-stream transports for the video source

use crate::error::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

mod file;
mod http;
mod mock;

pub use file::FileTransport;
pub use http::HttpTransport;
pub use mock::{MockTransport, ScriptedRead};

/// Chunks buffered between the pump thread and the extractor
const PUMP_QUEUE_DEPTH: usize = 64;

/// Outcome of one chunk read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRead {
    Data(Vec<u8>),
    /// Nothing arrived within the caller's timeout
    Timeout,
    /// Source closed cleanly
    End,
    /// Source failed mid-stream
    Error(String),
}

/// Persistent chunk iterator over an open stream
pub trait ChunkSource: Send {
    /// Wait up to `timeout` for the next chunk
    fn next_chunk(&mut self, timeout: Duration) -> ChunkRead;

    /// Release the underlying connection; later reads return `End`
    fn close(&mut self);
}

/// An opened stream: declared content type plus its byte source
pub struct OpenedStream {
    pub content_type: Option<String>,
    pub source: Box<dyn ChunkSource>,
}

/// Something that can (re)open a video byte stream
pub trait StreamTransport: Send {
    /// Open the stream. Fails with `StreamUnavailable` when the source is unreachable.
    fn open(&mut self) -> Result<OpenedStream>;

    /// Human-readable source name for logs
    fn describe(&self) -> String;
}

enum PumpMessage {
    Chunk(Vec<u8>),
    End,
    Error(String),
}

/// Chunk source fed by a background reader thread.
///
/// The thread blocks on the transport; the consumer waits on a bounded
/// channel with its own timeout, so a stalled connection never blocks the
/// control loop for longer than the caller asked.
pub struct PumpedSource {
    rx: Option<Receiver<PumpMessage>>,
    cancel: Arc<AtomicBool>,
    finished: bool,
}

impl PumpedSource {
    /// Start pumping `reader` in `chunk_size` reads on a named thread.
    pub fn spawn<R>(reader: R, chunk_size: usize, name: &str) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded(PUMP_QUEUE_DEPTH);
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || pump_loop(reader, chunk_size.max(1), tx, thread_cancel))?;

        Ok(Self {
            rx: Some(rx),
            cancel,
            finished: false,
        })
    }
}

impl ChunkSource for PumpedSource {
    fn next_chunk(&mut self, timeout: Duration) -> ChunkRead {
        if self.finished {
            return ChunkRead::End;
        }
        let Some(rx) = self.rx.as_ref() else {
            return ChunkRead::End;
        };
        match rx.recv_timeout(timeout) {
            Ok(PumpMessage::Chunk(data)) => ChunkRead::Data(data),
            Ok(PumpMessage::End) => {
                self.finished = true;
                ChunkRead::End
            }
            Ok(PumpMessage::Error(e)) => {
                self.finished = true;
                ChunkRead::Error(e)
            }
            Err(RecvTimeoutError::Timeout) => ChunkRead::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                ChunkRead::Error("reader thread exited".to_string())
            }
        }
    }

    fn close(&mut self) {
        self.cancel.store(true, Ordering::Release);
        // Dropping the receiver unblocks a pump waiting on a full queue
        self.rx = None;
        self.finished = true;
    }
}

impl Drop for PumpedSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn pump_loop<R: Read>(
    mut reader: R,
    chunk_size: usize,
    tx: Sender<PumpMessage>,
    cancel: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; chunk_size];

    while !cancel.load(Ordering::Acquire) {
        let msg = match reader.read(&mut buf) {
            Ok(0) => PumpMessage::End,
            Ok(n) => PumpMessage::Chunk(buf[..n].to_vec()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => PumpMessage::Error(e.to_string()),
        };
        let terminal = !matches!(msg, PumpMessage::Chunk(_));
        if tx.send(msg).is_err() || terminal {
            break;
        }
    }

    tracing::debug!("Stream pump exiting");
}
