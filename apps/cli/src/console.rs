//! Console output.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::debug;
use wmon_core::{ClientEvent, ClientObserver, OutputStream};

use crate::terminal::KeyboardMonitor;

/// Writes to stdout/stderr, adding carriage returns while the terminal
/// is raw.
#[derive(Clone, Default)]
pub struct Console {
    monitor: Option<Arc<KeyboardMonitor>>,
}

impl Console {
    pub fn new(monitor: Option<Arc<KeyboardMonitor>>) -> Self {
        Self { monitor }
    }

    fn is_raw(&self) -> bool {
        self.monitor.as_ref().is_some_and(|m| m.is_raw())
    }

    fn write_to(&self, out: &mut dyn Write, text: &str) {
        let result = if self.is_raw() {
            out.write_all(to_raw(text).as_bytes())
        } else {
            out.write_all(text.as_bytes())
        };
        if let Err(e) = result.and_then(|()| out.flush()) {
            debug!(error = %e, "Console write failed");
        }
    }

    pub fn print(&self, text: &str) {
        self.write_to(&mut io::stdout().lock(), text);
    }

    pub fn eprint(&self, text: &str) {
        self.write_to(&mut io::stderr().lock(), text);
    }

    pub fn line(&self, text: impl Display) {
        self.print(&format!("{text}\n"));
    }

    pub fn error_line(&self, text: impl Display) {
        self.eprint(&format!("{text}\n"));
    }
}

/// Raw mode turns off output post-processing, so a bare `\n` would not
/// return the cursor.
fn to_raw(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Renders client events for the person at the terminal.
pub struct ConsoleObserver {
    console: Console,
}

impl ConsoleObserver {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

impl ClientObserver for ConsoleObserver {
    fn on_event(&self, event: &ClientEvent) {
        let c = &self.console;
        match event {
            ClientEvent::Connected { host } => c.line(format_args!("connected to {host}")),
            ClientEvent::Output {
                stream: OutputStream::Stdout,
                text,
            } => c.print(text),
            ClientEvent::Output {
                stream: OutputStream::Stderr,
                text,
            } => c.eprint(text),
            ClientEvent::OtaProgress {
                offset,
                total,
                percentage,
            } => c.print(&format!("OTA progress ({offset}/{total}) ({percentage}%)\r")),
            ClientEvent::OtaFinished { success: true } => c.line("OTA finished"),
            ClientEvent::OtaFinished { success: false } => c.line("OTA failed"),
            ClientEvent::DeviceContinued => {
                c.line("host was awaiting for us and has now continued...")
            }
            ClientEvent::CoreDumpFound { len } => {
                c.line(format_args!("Found a coredump of {len} bytes, retrieving..."))
            }
            ClientEvent::CoreDumpError { message } => {
                c.error_line(format_args!("Error displaying coredump: {message}"))
            }
            ClientEvent::Rebooting { host } => c.line(format_args!("rebooting {host}...")),
            ClientEvent::UnknownCommand { opcode } => {
                c.error_line(format_args!("unknown command {opcode}"))
            }
            ClientEvent::Disconnected { .. }
            | ClientEvent::OtaStarted { .. }
            | ClientEvent::ConfigReceived => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_line_endings() {
        assert_eq!(to_raw("a\nb\n"), "a\r\nb\r\n");
        assert_eq!(to_raw("a\r\nb"), "a\r\nb");
        assert_eq!(to_raw("50%\r"), "50%\r");
    }
}
