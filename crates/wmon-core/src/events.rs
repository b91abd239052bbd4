//! Event system for UI decoupling.
//!
//! Everything the client wants a human to see is emitted as a
//! `ClientEvent`; the CLI renders them, tests record them.

use std::fmt;

/// Which device stream a passthrough blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Socket open, handshake probe sent.
    Connected { host: String },
    /// Dispatch loop ended.
    Disconnected { host: String },
    /// Device log passthrough.
    Output { stream: OutputStream, text: String },
    /// Firmware image handed to the writer.
    OtaStarted { total: usize },
    /// Device reported how far it got.
    OtaProgress {
        offset: u32,
        total: usize,
        percentage: usize,
    },
    /// Device finished (or gave up on) the update.
    OtaFinished { success: bool },
    /// Device resumed after waiting for us.
    DeviceContinued,
    /// A stored core dump was retrieved.
    CoreDumpFound { len: usize },
    /// Inspecting the core dump failed.
    CoreDumpError { message: String },
    /// Reboot requested.
    Rebooting { host: String },
    /// Config response delivered to a pending request.
    ConfigReceived,
    /// Opcode we don't know about.
    UnknownCommand { opcode: u8 },
}

/// Observer trait for receiving client events.
///
/// Called from the dispatch thread and from writer threads alike.
pub trait ClientObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ClientEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ClientObserver for NullObserver {
    fn on_event(&self, _event: &ClientEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ClientObserver for TracingObserver {
    fn on_event(&self, event: &ClientEvent) {
        match event {
            ClientEvent::Connected { host } => tracing::info!(host = %host, "Connected"),
            ClientEvent::Disconnected { host } => tracing::warn!(host = %host, "Disconnected"),
            ClientEvent::Output { stream, text } => {
                tracing::info!(stream = %stream, "{}", text.trim_end())
            }
            ClientEvent::OtaStarted { total } => tracing::info!(total, "OTA started"),
            ClientEvent::OtaProgress {
                offset,
                total,
                percentage,
            } => {
                tracing::debug!(offset, total, progress = %format!("{}%", percentage), "OTA progress")
            }
            ClientEvent::OtaFinished { success: true } => tracing::info!("OTA finished"),
            ClientEvent::OtaFinished { success: false } => tracing::error!("OTA failed"),
            ClientEvent::DeviceContinued => tracing::info!("Device continued"),
            ClientEvent::CoreDumpFound { len } => tracing::warn!(len, "Core dump found"),
            ClientEvent::CoreDumpError { message } => {
                tracing::error!("Error displaying core dump: {}", message)
            }
            ClientEvent::Rebooting { host } => tracing::info!(host = %host, "Rebooting"),
            ClientEvent::ConfigReceived => tracing::debug!("Config received"),
            ClientEvent::UnknownCommand { opcode } => tracing::warn!(opcode, "Unknown command"),
        }
    }
}

/// Observer that keeps every event, for tests and post-mortems.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<ClientEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything seen so far.
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ClientObserver for RecordingObserver {
    fn on_event(&self, event: &ClientEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
