//! Output byte sink capability.
//!
//! The render pipeline streams decoded PDF bytes into a [`ByteSink`] instead
//! of a concrete body writer, which keeps the core independent of any
//! particular streaming stack while preserving backpressure: a sink that
//! reports `stopped()` makes the `IO.read` loop break early.

use std::io;

/// Destination for a rendered PDF byte stream.
#[allow(async_fn_in_trait)]
pub trait ByteSink: Send {
    /// Append a chunk of decoded bytes.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Signal a successful end of stream. Called at most once.
    async fn complete(&mut self) -> io::Result<()>;

    /// Backpressure signal: when true, the producer stops streaming.
    fn stopped(&self) -> bool;
}

/// In-memory sink collecting the whole document.
///
/// Used by the CLI (collect, then write the file once) and by tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    data: Vec<u8>,
    completed: bool,
    /// When set, `stopped()` turns true once this many bytes arrived.
    stop_after: Option<usize>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that asks the producer to stop after `limit` bytes.
    pub fn with_stop_after(limit: usize) -> Self {
        Self {
            stop_after: Some(limit),
            ..Self::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSink for BufferSink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    async fn complete(&mut self) -> io::Result<()> {
        self.completed = true;
        Ok(())
    }

    fn stopped(&self) -> bool {
        self.stop_after.is_some_and(|limit| self.data.len() >= limit)
    }
}
