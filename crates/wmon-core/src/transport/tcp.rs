//! TCP transport implementation.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError};

/// Transport over a plain TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
}

impl TcpTransport {
    /// Dial `addr` (`ip:port`).
    #[instrument(level = "info")]
    pub fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        // Frames are tiny and latency matters more than batching.
        stream.set_nodelay(true)?;
        info!(peer = %addr, "TCP connection established");
        Ok(Self {
            stream,
            peer: addr.to_string(),
        })
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        (&self.stream).write_all(data)?;
        debug!(bytes_written = data.len(), "Write complete");
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.stream.set_read_timeout(Some(timeout))?;
        match (&self.stream).read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already went away; the socket is as closed as it gets.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}
