//! Mock transport for testing

use super::{ChunkRead, ChunkSource, OpenedStream, StreamTransport};
use crate::error::{LakshyaError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One scripted read result
#[derive(Clone, Debug)]
pub enum ScriptedRead {
    Data(Vec<u8>),
    /// Reported as a read timeout
    Stall,
    /// Reported as a mid-stream transport failure
    Error(String),
}

/// Mock transport for unit testing
///
/// Each `open()` consumes the next scripted session; once they run out the
/// stream is reported unavailable.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    sessions: VecDeque<(Option<String>, Vec<ScriptedRead>)>,
    opens: usize,
    closes: Vec<Instant>,
}

impl MockTransport {
    /// Create a new mock transport with no sessions
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session that replays `reads` and then ends
    pub fn push_session(&self, content_type: Option<&str>, reads: Vec<ScriptedRead>) {
        self.inner
            .lock()
            .sessions
            .push_back((content_type.map(str::to_string), reads));
    }

    /// Queue a session that delivers `bytes` in `chunk_size` pieces
    pub fn push_bytes(&self, content_type: Option<&str>, bytes: &[u8], chunk_size: usize) {
        let reads = bytes
            .chunks(chunk_size.max(1))
            .map(|c| ScriptedRead::Data(c.to_vec()))
            .collect();
        self.push_session(content_type, reads);
    }

    /// Number of successful and failed `open()` calls so far
    pub fn open_count(&self) -> usize {
        self.inner.lock().opens
    }

    /// When each opened source was closed, oldest first
    pub fn close_times(&self) -> Vec<Instant> {
        self.inner.lock().closes.clone()
    }
}

impl StreamTransport for MockTransport {
    fn open(&mut self) -> Result<OpenedStream> {
        let mut inner = self.inner.lock();
        inner.opens += 1;
        let (content_type, reads) = inner
            .sessions
            .pop_front()
            .ok_or_else(|| LakshyaError::StreamUnavailable("mock: no session left".into()))?;
        Ok(OpenedStream {
            content_type,
            source: Box::new(ScriptedSource {
                reads: reads.into(),
                transport: Arc::clone(&self.inner),
                closed: false,
            }),
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

struct ScriptedSource {
    reads: VecDeque<ScriptedRead>,
    transport: Arc<Mutex<MockTransportInner>>,
    closed: bool,
}

impl ChunkSource for ScriptedSource {
    fn next_chunk(&mut self, _timeout: Duration) -> ChunkRead {
        match self.reads.pop_front() {
            Some(ScriptedRead::Data(d)) => ChunkRead::Data(d),
            Some(ScriptedRead::Stall) => ChunkRead::Timeout,
            Some(ScriptedRead::Error(e)) => {
                self.reads.clear();
                ChunkRead::Error(e)
            }
            None => ChunkRead::End,
        }
    }

    fn close(&mut self) {
        self.reads.clear();
        if !self.closed {
            self.closed = true;
            self.transport.lock().closes.push(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_is_recorded_once_per_source() {
        let mut transport = MockTransport::new();
        transport.push_session(None, vec![ScriptedRead::Data(vec![1, 2])]);
        let mut opened = transport.open().unwrap();

        assert!(transport.close_times().is_empty());
        opened.source.close();
        opened.source.close();
        assert_eq!(transport.close_times().len(), 1);
        assert!(matches!(
            opened.source.next_chunk(Duration::ZERO),
            ChunkRead::End
        ));
    }
}
