//! Inbound field reads and the timeout policy.

use std::sync::atomic::Ordering;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, warn};

use super::{Client, ClientError};
use crate::events::ClientObserver;
use crate::protocol::Opcode;
use crate::transport::{Transport, TransportError};

/// Upper bound for any length-prefixed blob from the device.
const MAX_BLOB_LEN: usize = 16 * 1024 * 1024;

/// Integer width of a blob's length prefix.
pub trait LengthPrefix {
    const WIDTH: usize;

    fn decode(bytes: &[u8]) -> usize;
}

impl LengthPrefix for u16 {
    const WIDTH: usize = 2;

    fn decode(bytes: &[u8]) -> usize {
        BigEndian::read_u16(bytes) as usize
    }
}

impl LengthPrefix for u32 {
    const WIDTH: usize = 4;

    fn decode(bytes: &[u8]) -> usize {
        BigEndian::read_u32(bytes) as usize
    }
}

impl<O: ClientObserver + 'static> Client<O> {
    /// Classify a read error.
    ///
    /// The first timeout of a streak is swallowed: during an active OTA
    /// transfer silently, otherwise after sending one keepalive ping. A
    /// second consecutive timeout, or any other error, is handed back.
    pub fn handle_error(&self, err: TransportError) -> Result<(), TransportError> {
        if err.is_timeout() && self.timeouts.load(Ordering::SeqCst) == 0 {
            if self.is_flashing_ota() {
                return Ok(());
            }
            self.timeouts.fetch_add(1, Ordering::SeqCst);
            debug!("Read timed out, sending keepalive");
            if let Err(e) = self.send(Opcode::Ping) {
                warn!(error = %e, "Keepalive failed");
            }
            return Ok(());
        }
        Err(err)
    }

    /// Number of consecutive timeouts seen by the dispatch loop.
    pub fn timeout_streak(&self) -> u32 {
        self.timeouts.load(Ordering::SeqCst)
    }

    /// Fill `buf` completely, retrying through tolerated timeouts.
    ///
    /// Bytes already received are kept across retries, so a tolerated
    /// timeout never shifts the frame boundary.
    pub(crate) fn read_exact_within(
        &self,
        transport: &dyn Transport,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            match transport.read(&mut buf[filled..], timeout) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => filled += n,
                Err(e) => self.handle_error(e)?,
            }
        }
        Ok(())
    }

    pub(crate) fn read_u16(&self, transport: &dyn Transport) -> Result<u16, TransportError> {
        let mut buf = [0u8; 2];
        self.read_exact_within(transport, &mut buf, self.config.field_timeout)?;
        Ok(BigEndian::read_u16(&buf))
    }

    pub(crate) fn read_u32(&self, transport: &dyn Transport) -> Result<u32, TransportError> {
        let mut buf = [0u8; 4];
        self.read_exact_within(transport, &mut buf, self.config.field_timeout)?;
        Ok(BigEndian::read_u32(&buf))
    }

    /// Read a blob prefixed with an `L`-sized big-endian length.
    ///
    /// The length is read under the field deadline, the body under
    /// `timeout`.
    pub(crate) fn read_blob<L: LengthPrefix>(
        &self,
        transport: &dyn Transport,
        timeout: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        let mut prefix = [0u8; 4];
        let prefix = &mut prefix[..L::WIDTH];
        self.read_exact_within(transport, prefix, self.config.field_timeout)?;
        let len = L::decode(prefix);
        if len > MAX_BLOB_LEN {
            return Err(ClientError::BlobTooLarge {
                len,
                max: MAX_BLOB_LEN,
            });
        }
        let mut data = vec![0u8; len];
        self.read_exact_within(transport, &mut data, timeout)?;
        Ok(data)
    }
}
