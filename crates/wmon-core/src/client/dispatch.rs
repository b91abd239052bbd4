//! Dispatch loop - reads one frame at a time and acts on it.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, instrument, trace, warn};

use super::{Client, ClientError, lock};
use crate::events::{ClientEvent, ClientObserver, OutputStream};
use crate::protocol::{HostConfig, Opcode};
use crate::transport::{Transport, TransportError};

impl<O: ClientObserver + 'static> Client<O> {
    /// Run the dispatch loop until the connection ends.
    ///
    /// Returns `Ok(())` when the connection was closed locally (or never
    /// opened) and the error otherwise; the caller is expected to
    /// reconnect after an error.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<(), ClientError> {
        let result = self.dispatch_loop();
        match &result {
            Ok(()) => debug!("Dispatch loop finished"),
            Err(e) => warn!(error = %e, "Dispatch loop failed"),
        }
        let host = self.host().map(|h| h.name).unwrap_or_default();
        self.emit(ClientEvent::Disconnected { host });
        result
    }

    fn closed_locally(&self) -> bool {
        !self.is_connected()
    }

    fn dispatch_loop(&self) -> Result<(), ClientError> {
        let mut opcode = [0u8; 1];
        loop {
            let Some(transport) = self.transport() else {
                // close() was called
                return Ok(());
            };

            // Short deadline so we notice a dead device quickly.
            match transport.read(&mut opcode, self.config.opcode_timeout) {
                Ok(0) => {
                    if self.closed_locally() {
                        return Ok(());
                    }
                    return Err(TransportError::Disconnected.into());
                }
                Ok(_) => {}
                Err(e) => {
                    if self.closed_locally() {
                        return Ok(());
                    }
                    self.handle_error(e)?;
                    continue;
                }
            }
            self.timeouts.store(0, Ordering::SeqCst);

            if let Err(e) = self.dispatch(&transport, opcode[0]) {
                if self.closed_locally() {
                    return Ok(());
                }
                return Err(e);
            }
        }
    }

    /// Handle one frame whose opcode byte has been read.
    fn dispatch(&self, transport: &Arc<dyn Transport>, byte: u8) -> Result<(), ClientError> {
        let op = match Opcode::try_from(byte) {
            Ok(op) if op.is_inbound() => op,
            _ => {
                self.unknown(byte);
                return Ok(());
            }
        };
        trace!(op = %op, "Frame received");
        let transport = transport.as_ref();

        match op {
            Opcode::PrintStdout => self.print(transport, OutputStream::Stdout)?,
            Opcode::PrintStderr => self.print(transport, OutputStream::Stderr)?,
            Opcode::Pong => {}
            Opcode::OtaProgress => self.ota_progress(transport)?,
            Opcode::OtaSuccess | Opcode::OtaFailed => {
                if self.is_flashing_ota() {
                    let success = op == Opcode::OtaSuccess;
                    lock(&self.ota).finish();
                    info!(success, "OTA transfer finished");
                    self.emit(ClientEvent::OtaFinished { success });
                }
            }
            Opcode::Continue => self.emit(ClientEvent::DeviceContinued),
            Opcode::CoredumpRead => self.coredump(transport)?,
            Opcode::CoredumpErase => {
                // Erased; let the device carry on booting.
                self.send(Opcode::Continue)?;
            }
            Opcode::Config => self.config_response(transport)?,
            // Host-only opcodes, rejected above.
            Opcode::Ping
            | Opcode::Reboot
            | Opcode::Ota
            | Opcode::GetConfig
            | Opcode::SetConfig => {}
        }
        Ok(())
    }

    fn unknown(&self, byte: u8) {
        warn!(opcode = byte, "Unknown command");
        self.emit(ClientEvent::UnknownCommand { opcode: byte });
    }

    fn print(&self, transport: &dyn Transport, stream: OutputStream) -> Result<(), ClientError> {
        let data = self.read_blob::<u32>(transport, self.config.text_timeout)?;
        // Don't interleave device logs with the progress line.
        if !self.is_flashing_ota() {
            self.emit(ClientEvent::Output {
                stream,
                text: String::from_utf8_lossy(&data).into_owned(),
            });
        }
        Ok(())
    }

    fn ota_progress(&self, transport: &dyn Transport) -> Result<(), ClientError> {
        // Always drain the offset to stay in frame.
        let offset = self.read_u32(transport)?;
        if !self.is_flashing_ota() {
            trace!(offset, "Ignoring stray OTA progress");
            return Ok(());
        }
        let (total, percentage) = {
            let mut ota = lock(&self.ota);
            ota.touch(Instant::now());
            (ota.size(), ota.percentage(offset))
        };
        self.emit(ClientEvent::OtaProgress {
            offset,
            total,
            percentage,
        });
        Ok(())
    }

    fn coredump(&self, transport: &dyn Transport) -> Result<(), ClientError> {
        let data = self.read_blob::<u32>(transport, self.config.field_timeout)?;
        if data.is_empty() {
            debug!("No core dump stored");
            self.send(Opcode::Continue)?;
            return Ok(());
        }

        info!(len = data.len(), "Retrieved core dump");
        self.emit(ClientEvent::CoreDumpFound { len: data.len() });
        let erase = match self.inspector.inspect(&data) {
            Ok(disposition) => disposition.erase_on_device(),
            Err(e) => {
                self.emit(ClientEvent::CoreDumpError {
                    message: e.to_string(),
                });
                false
            }
        };
        if erase {
            self.send(Opcode::CoredumpErase)?;
        } else {
            self.send(Opcode::Continue)?;
        }
        Ok(())
    }

    fn config_response(&self, transport: &dyn Transport) -> Result<(), ClientError> {
        let size = self.read_u16(transport)? as usize;
        let cfg = if size > 0 {
            let mut payload = vec![0u8; size];
            self.read_exact_within(transport, &mut payload, self.config.field_timeout)?;
            HostConfig::decode_payload(&payload)?
        } else {
            HostConfig::default()
        };
        debug!(ssid = %cfg.ssid, mode = %cfg.mode, "Config received");

        let pending = lock(&self.on_config).take();
        match pending {
            Some(callback) => {
                self.emit(ClientEvent::ConfigReceived);
                callback(cfg);
            }
            // Unsolicited: the device confirming a set-config. Reboot to
            // apply it.
            None => self.reboot()?,
        }
        Ok(())
    }
}
