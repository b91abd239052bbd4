//! Raw-mode keyboard capture and line prompts.
//!
//! While capturing, a background thread polls crossterm for key presses
//! so single keystrokes act as commands. Anything that needs the
//! terminal the ordinary way (prompts, `make`, the symbolizer) pauses the
//! capture first; the reader parks itself before cooked mode comes back.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{debug, warn};
use wmon_core::{CaptureSuspension, Prompter, TerminalCapture};

use crate::event::AppEvent;

/// How long the reader blocks in one poll; bounds the latency of `pause`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct CaptureState {
    raw: bool,
    /// Outstanding `pause` calls.
    pauses: usize,
    reader_running: bool,
    /// Reader is waiting and won't touch the terminal.
    reader_parked: bool,
    closed: bool,
}

/// Owner of the terminal's raw mode.
pub struct KeyboardMonitor {
    state: Mutex<CaptureState>,
    changed: Condvar,
}

impl KeyboardMonitor {
    /// Enter raw mode.
    pub fn open() -> io::Result<Arc<Self>> {
        enable_raw_mode()?;
        Ok(Arc::new(Self {
            state: Mutex::new(CaptureState {
                raw: true,
                ..Default::default()
            }),
            changed: Condvar::new(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, CaptureState>) -> MutexGuard<'a, CaptureState> {
        self.changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether output currently needs explicit carriage returns.
    pub fn is_raw(&self) -> bool {
        self.lock().raw
    }

    /// Start forwarding key presses to `sender`.
    pub fn spawn_reader(self: &Arc<Self>, sender: Sender<AppEvent>) -> JoinHandle<()> {
        self.lock().reader_running = true;
        let monitor = Arc::clone(self);
        thread::spawn(move || {
            monitor.read_keys(&sender);
            let mut state = monitor.lock();
            state.reader_running = false;
            monitor.changed.notify_all();
        })
    }

    fn read_keys(&self, sender: &Sender<AppEvent>) {
        while self.wait_until_captured() {
            match event::poll(POLL_INTERVAL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        if sender.send(AppEvent::Key(key)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to read key");
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to poll keyboard");
                    break;
                }
            }
        }
        debug!("Key reader stopped");
    }

    /// Park while paused. Returns `false` once the monitor is closed.
    fn wait_until_captured(&self) -> bool {
        let mut state = self.lock();
        while state.pauses > 0 && !state.closed {
            state.reader_parked = true;
            self.changed.notify_all();
            state = self.wait(state);
        }
        state.reader_parked = false;
        !state.closed
    }

    /// Leave raw mode for good and stop the reader.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.closed = true;
        self.changed.notify_all();
        if state.raw {
            disable_raw_mode()?;
            state.raw = false;
        }
        Ok(())
    }
}

impl TerminalCapture for KeyboardMonitor {
    fn pause(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.pauses += 1;
        if state.pauses > 1 || state.closed {
            return Ok(());
        }
        self.changed.notify_all();
        while state.reader_running && !state.reader_parked && !state.closed {
            state = self.wait(state);
        }
        if state.raw {
            disable_raw_mode()?;
            state.raw = false;
        }
        Ok(())
    }

    fn resume(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.pauses = state.pauses.saturating_sub(1);
        if state.pauses > 0 || state.closed {
            return Ok(());
        }
        enable_raw_mode()?;
        state.raw = true;
        self.changed.notify_all();
        Ok(())
    }
}

/// Reads answers from stdin, with the terminal in cooked mode.
pub struct LinePrompter {
    terminal: Arc<dyn TerminalCapture>,
}

impl LinePrompter {
    pub fn new(terminal: Arc<dyn TerminalCapture>) -> Self {
        Self { terminal }
    }
}

impl Prompter for LinePrompter {
    fn prompt(&self, message: &str) -> io::Result<String> {
        let _terminal = CaptureSuspension::acquire(self.terminal.as_ref())?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(message.as_bytes())?;
        stdout.flush()?;
        drop(stdout);

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
        }
        Ok(line.trim().to_string())
    }
}
