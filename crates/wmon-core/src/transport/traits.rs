//! Byte-stream transport abstraction.
//!
//! Defines the `Transport` trait the client talks through, so the
//! dispatcher can be driven by a real socket or a scripted mock.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("error connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection closed by peer")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this is a read deadline expiring rather than a broken link.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Abstract full-duplex byte stream.
///
/// Reads and writes take `&self` so one reader thread and any number of
/// writers can share a handle; writers are serialized by the client.
pub trait Transport: Send + Sync {
    /// Write all of `data`.
    fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when the peer closed the stream.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Shut the stream down in both directions.
    fn close(&self) -> Result<(), TransportError>;

    /// Remote endpoint, for diagnostics.
    fn peer(&self) -> String;
}
