//! Connection slot shared by the dispatch loop and the writers.
//!
//! State and handle change together under one lock, so the reader can
//! tell an intentional local close (`Closing`/`Closed`) from a network
//! failure (still `Connected` when the read fails).

use std::fmt;
use std::sync::Arc;

use crate::discovery::Host;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Handle installed, loop should keep reading.
    Connected,
    /// `close` took the handle and is shutting the socket down.
    Closing,
    /// Never connected or closed locally.
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connected => write!(f, "CONNECTED"),
            LinkState::Closing => write!(f, "CLOSING"),
            LinkState::Closed => write!(f, "CLOSED"),
        }
    }
}

pub(crate) struct Link {
    pub state: LinkState,
    pub transport: Option<Arc<dyn Transport>>,
    pub host: Option<Host>,
}

impl Link {
    pub fn new() -> Self {
        Self {
            state: LinkState::Closed,
            transport: None,
            host: None,
        }
    }

    /// Handle for I/O, only while connected.
    pub fn active(&self) -> Option<Arc<dyn Transport>> {
        match self.state {
            LinkState::Connected => self.transport.clone(),
            _ => None,
        }
    }
}
