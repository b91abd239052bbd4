//! Mock transport for testing.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::traits::{Transport, TransportError};

/// One scripted inbound step.
#[derive(Debug, Clone)]
enum Step {
    Bytes(Vec<u8>),
    Timeout,
    Eof,
}

/// Mock transport for driving the dispatcher from tests.
///
/// Inbound data is scripted up front; every write is captured. Clones
/// share state, so a test can keep one handle while the client owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    inbound: Arc<Mutex<VecDeque<Step>>>,
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// When the script runs dry, sleep for the read deadline before
    /// timing out, like a real socket would.
    wait_when_empty: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    fail_close: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            wait_when_empty: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            fail_close: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue bytes to be returned by subsequent reads.
    pub fn queue_bytes(&self, data: &[u8]) {
        self.inbound
            .lock()
            .unwrap()
            .push_back(Step::Bytes(data.to_vec()));
    }

    /// Queue a single read deadline expiry.
    pub fn queue_timeout(&self) {
        self.inbound.lock().unwrap().push_back(Step::Timeout);
    }

    /// Queue an orderly end of stream.
    pub fn queue_eof(&self) {
        self.inbound.lock().unwrap().push_back(Step::Eof);
    }

    /// Sleep out the deadline instead of timing out immediately once the
    /// script is exhausted.
    pub fn wait_when_empty(&self, wait: bool) {
        self.wait_when_empty.store(wait, Ordering::SeqCst);
    }

    /// Make the next `close` calls fail.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Get all captured writes, one entry per `write` call.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.write_log.lock().unwrap().concat()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Io(io::Error::from(
                io::ErrorKind::ConnectionAborted,
            )));
        }
        let step = self.inbound.lock().unwrap().pop_front();
        match step {
            Some(Step::Bytes(mut data)) => {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.inbound.lock().unwrap().push_front(Step::Bytes(rest));
                }
                Ok(n)
            }
            Some(Step::Eof) => Ok(0),
            Some(Step::Timeout) => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            None => {
                if self.wait_when_empty.load(Ordering::SeqCst) {
                    thread::sleep(timeout);
                }
                Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::other("close failed")));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}
