//! wmon-core: host side of the wmonitor device link.
//!
//! The device keeps a TCP session open to the host and multiplexes log
//! passthrough, reboot, OTA firmware upload, post-crash core-dump
//! retrieval and Wi-Fi provisioning over one length-framed binary
//! protocol.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Opcodes, config record codec, frame builders
//! - **Transport**: Byte-stream abstraction (TCP, mock) and write pacing
//! - **Client**: Connection slot, timeout policy, dispatch loop, OTA
//! - **Events**: Observer pattern for UI decoupling
//! - **Core dump**: Retrieval workflow around an external symbolizer
//! - **Collab / Discovery / Project**: Interfaces to the prompt, the
//!   terminal, the symbolizer, device lookup and the build system
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wmon_core::{Client, ClientConfig, Host, KeepCoreDump, TracingObserver};
//!
//! let client = Client::new(
//!     ClientConfig::default(),
//!     Arc::new(TracingObserver),
//!     Arc::new(KeepCoreDump),
//! );
//! client.connect(&Host::new("esp32", "192.168.1.20:4242"))?;
//! client.run()?;
//! # Ok::<(), wmon_core::ClientError>(())
//! ```

pub mod client;
pub mod collab;
pub mod config;
pub mod coredump;
pub mod discovery;
pub mod events;
pub mod project;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use client::{Client, ClientError, LinkState, OtaTracker};
pub use collab::{
    CaptureSuspension, EspCoredump, NoTerminal, Prompter, ScriptedPrompter, Symbolizer,
    SymbolizerMode, TerminalCapture,
};
pub use config::{ClientConfig, SessionConfig, SessionOverrides};
pub use coredump::{CoreDumpInspector, CoreDumpWorkflow, Disposition, KeepCoreDump};
pub use discovery::{Discovery, Host, StaticDiscovery};
pub use events::{ClientEvent, ClientObserver, NullObserver, OutputStream, TracingObserver};
pub use project::{MakeVariables, ProjectInfo};
pub use protocol::{HostConfig, Opcode, WifiMode};
pub use transport::{MockTransport, Pacing, TcpTransport, Transport, TransportError};
