//! Device session client.
//!
//! One `Client` lives for the whole process and is reused across
//! reconnects. A single thread runs [`Client::run`], reading one frame at
//! a time; any number of other threads may issue commands concurrently.
//! Outbound writes are serialized by one lock and paced to protect the
//! device's receive buffer.

mod dispatch;
mod link;
mod ota;
mod reader;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::coredump::CoreDumpInspector;
use crate::discovery::Host;
use crate::events::{ClientEvent, ClientObserver};
use crate::protocol::{ConfigError, HostConfig, Opcode, ota_frame, single_byte};
use crate::transport::{TcpTransport, Transport, TransportError};

pub use link::LinkState;
pub use ota::OtaTracker;
pub use reader::LengthPrefix;

use link::Link;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid config record: {0}")]
    Config(#[from] ConfigError),

    #[error("blob of {len} bytes exceeds the {max} byte limit")]
    BlobTooLarge { len: usize, max: usize },

    #[error("failed to read firmware image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Continuation for a pending `get-config` request.
pub type ConfigCallback = Box<dyn FnOnce(HostConfig) + Send>;

/// Session with one device.
pub struct Client<O: ClientObserver> {
    config: ClientConfig,
    observer: Arc<O>,
    inspector: Arc<dyn CoreDumpInspector>,
    link: Mutex<Link>,
    /// Serializes outbound frames.
    write_lock: Mutex<()>,
    /// Consecutive read timeouts; only the dispatch thread touches it.
    timeouts: AtomicU32,
    ota: Mutex<OtaTracker>,
    /// At most one `get-config` may be outstanding; a second request
    /// replaces the first continuation.
    on_config: Mutex<Option<ConfigCallback>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<O: ClientObserver + 'static> Client<O> {
    pub fn new(config: ClientConfig, observer: Arc<O>, inspector: Arc<dyn CoreDumpInspector>) -> Self {
        Self {
            ota: Mutex::new(OtaTracker::new(config.ota_window)),
            config,
            observer,
            inspector,
            link: Mutex::new(Link::new()),
            write_lock: Mutex::new(()),
            timeouts: AtomicU32::new(0),
            on_config: Mutex::new(None),
        }
    }

    fn emit(&self, event: ClientEvent) {
        self.observer.on_event(&event);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ========================================================================
    // Connection management
    // ========================================================================

    /// Dial the device and run the handshake probe.
    #[instrument(skip(self), fields(host = %host.name, addr = %host.addr))]
    pub fn connect(&self, host: &Host) -> Result<(), ClientError> {
        let transport = TcpTransport::connect(&host.addr)?;
        self.attach(host.clone(), Arc::new(transport))
    }

    /// Install an already open transport.
    ///
    /// Resets the timeout streak, OTA state and any pending config
    /// request, then asks the device for a
    /// stored core dump before anything else happens on the link.
    pub fn attach(&self, host: Host, transport: Arc<dyn Transport>) -> Result<(), ClientError> {
        {
            let mut link = lock(&self.link);
            link.transport = Some(transport);
            link.state = LinkState::Connected;
            link.host = Some(host.clone());
        }
        self.timeouts.store(0, Ordering::SeqCst);
        lock(&self.ota).reset();
        // An answer on the new link is not the one that request waited for.
        if lock(&self.on_config).take().is_some() {
            debug!("Dropping config request from previous connection");
        }
        info!(host = %host, "Connected");
        self.emit(ClientEvent::Connected { host: host.name });

        self.send(Opcode::CoredumpRead)?;
        Ok(())
    }

    /// Close the connection. Safe to call when not connected.
    ///
    /// The handle leaves the slot before the socket is shut down, so the
    /// dispatch loop sees an intentional close rather than a failure. If
    /// shutting down fails the handle is put back.
    pub fn close(&self) -> Result<(), ClientError> {
        let transport = {
            let mut link = lock(&self.link);
            let Some(transport) = link.transport.take() else {
                link.state = LinkState::Closed;
                return Ok(());
            };
            link.state = LinkState::Closing;
            transport
        };

        match transport.close() {
            Ok(()) => {
                lock(&self.link).state = LinkState::Closed;
                debug!(peer = %transport.peer(), "Connection closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Close failed, keeping connection");
                let mut link = lock(&self.link);
                link.transport = Some(transport);
                link.state = LinkState::Connected;
                Err(e.into())
            }
        }
    }

    pub fn link_state(&self) -> LinkState {
        lock(&self.link).state
    }

    pub fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    /// Device of the current (or last) connection.
    pub fn host(&self) -> Option<Host> {
        lock(&self.link).host.clone()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.link).active()
    }

    // ========================================================================
    // Outbound frames
    // ========================================================================

    /// Write one frame, paced into chunks.
    ///
    /// A frame is bound to the connection it started on. The slot is
    /// consulted before every chunk; if the connection was closed or
    /// replaced meanwhile the rest of the frame is dropped.
    pub fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let _guard = lock(&self.write_lock);
        let transport = self.transport().ok_or(TransportError::NotConnected)?;
        self.config.pacing.write_paced(data, |chunk| {
            match self.transport() {
                Some(current) if Arc::ptr_eq(&current, &transport) => {}
                _ => {
                    warn!("Connection changed mid-frame, dropping the rest");
                    return Err(TransportError::NotConnected);
                }
            }
            transport.write(chunk)
        })
    }

    /// Send a payload-less command.
    pub fn send(&self, op: Opcode) -> Result<(), TransportError> {
        debug!(op = %op, "Sending command");
        self.write(&single_byte(op))
    }

    /// Ask the device to restart.
    pub fn reboot(&self) -> Result<(), ClientError> {
        let host = self.host().map(|h| h.name).unwrap_or_default();
        self.emit(ClientEvent::Rebooting { host });
        self.send(Opcode::Reboot)?;
        Ok(())
    }

    /// Request the device's Wi-Fi config; `callback` runs on the dispatch
    /// thread when the answer arrives.
    pub fn get_config(&self, callback: impl FnOnce(HostConfig) + Send + 'static) -> Result<(), ClientError> {
        if lock(&self.on_config).replace(Box::new(callback)).is_some() {
            warn!("Replacing unanswered config request");
        }
        self.send(Opcode::GetConfig)?;
        Ok(())
    }

    /// Push a new Wi-Fi config. The device echoes a config frame back,
    /// which triggers a reboot to apply it.
    pub fn set_config(&self, cfg: &HostConfig) -> Result<(), ClientError> {
        let frame = cfg.set_config_frame()?;
        info!(ssid = %cfg.ssid, mode = %cfg.mode, "Sending config");
        self.write(&frame)?;
        Ok(())
    }

    // ========================================================================
    // OTA
    // ========================================================================

    /// Whether an upload is in progress and the device was heard from
    /// within the activity window.
    pub fn is_flashing_ota(&self) -> bool {
        lock(&self.ota).is_active_at(Instant::now())
    }

    /// Upload a firmware image from disk. Blocks for the whole paced upload.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn flash(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let path = path.as_ref();
        let image = std::fs::read(path).map_err(|source| ClientError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        self.flash_image(&image)
    }

    /// Upload an in-memory firmware image.
    pub fn flash_image(&self, image: &[u8]) -> Result<(), ClientError> {
        // Active before the first byte leaves, so a stalled writer is
        // covered by the activity window too.
        lock(&self.ota).begin(image.len(), Instant::now());
        info!(size = image.len(), "Starting OTA upload");
        self.emit(ClientEvent::OtaStarted { total: image.len() });
        self.write(&ota_frame(image))?;
        debug!("OTA image handed to device");
        Ok(())
    }

    /// Run [`flash`](Self::flash) on its own thread.
    pub fn flash_in_background(self: &Arc<Self>, path: PathBuf) -> JoinHandle<Result<(), ClientError>> {
        let client = Arc::clone(self);
        thread::spawn(move || client.flash(path))
    }
}
