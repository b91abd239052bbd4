//! Outbound bandwidth cap.
//!
//! The device's receive buffer is small; large frames are cut into
//! fixed-size chunks with a pause between consecutive chunks.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::protocol::constants::{WRITE_CHUNK_INTERVAL, WRITE_CHUNK_SIZE};

/// Chunking parameters for outbound writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Largest slice written in one go.
    pub chunk_size: usize,
    /// Pause between two consecutive chunks.
    #[serde(with = "crate::config::millis")]
    pub interval: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            chunk_size: WRITE_CHUNK_SIZE,
            interval: WRITE_CHUNK_INTERVAL,
        }
    }
}

impl Pacing {
    /// Number of chunks a payload of `len` bytes is split into.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size.max(1))
    }

    /// Feed `data` to `write` chunk by chunk, pausing between chunks but
    /// not after the last one.
    pub fn write_paced<E>(
        &self,
        data: &[u8],
        mut write: impl FnMut(&[u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        for (index, chunk) in data.chunks(self.chunk_size.max(1)).enumerate() {
            if index > 0 && !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
            trace!(index, len = chunk.len(), "Writing chunk");
            write(chunk)?;
        }
        Ok(())
    }
}
