//! Interfaces to the world outside the protocol engine: the person at
//! the keyboard, the raw-mode terminal and the core-dump symbolizer.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{info, instrument, warn};

// ============================================================================
// Prompting
// ============================================================================

/// Asks the user a question and returns the trimmed answer line.
pub trait Prompter: Send + Sync {
    fn prompt(&self, message: &str) -> io::Result<String>;
}

/// Repeat `message` until `parse` accepts the answer.
pub fn prompt_until<T>(
    prompter: &dyn Prompter,
    message: &str,
    mut parse: impl FnMut(&str) -> Option<T>,
) -> io::Result<T> {
    loop {
        let answer = prompter.prompt(message)?;
        if let Some(value) = parse(answer.trim()) {
            return Ok(value);
        }
    }
}

/// Prompter fed from a fixed list of answers.
///
/// Runs out with `UnexpectedEof`, so a test that asks more than it
/// scripted fails instead of hanging.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&self, message: &str) -> io::Result<String> {
        self.asked.lock().unwrap().push(message.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer"))
    }
}

// ============================================================================
// Terminal capture
// ============================================================================

/// Raw-mode keyboard capture that can be handed back to the terminal.
pub trait TerminalCapture: Send + Sync {
    /// Stop capturing and restore cooked mode.
    fn pause(&self) -> io::Result<()>;
    /// Re-enter raw mode and resume capturing.
    fn resume(&self) -> io::Result<()>;
}

/// Terminal that is never captured (non-interactive runs, tests).
pub struct NoTerminal;

impl TerminalCapture for NoTerminal {
    fn pause(&self) -> io::Result<()> {
        Ok(())
    }

    fn resume(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Exclusive use of the terminal for as long as the guard lives.
///
/// Capture is resumed on drop, whatever path leaves the scope.
pub struct CaptureSuspension<'a> {
    terminal: &'a dyn TerminalCapture,
}

impl<'a> CaptureSuspension<'a> {
    pub fn acquire(terminal: &'a dyn TerminalCapture) -> io::Result<Self> {
        terminal.pause()?;
        Ok(Self { terminal })
    }
}

impl Drop for CaptureSuspension<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.resume() {
            warn!(error = %e, "Failed to resume terminal capture");
        }
    }
}

// ============================================================================
// Symbolizer
// ============================================================================

#[derive(Error, Debug)]
pub enum SymbolizerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("symbolizer exited with {0}")]
    Failed(ExitStatus),
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

/// How the symbolizer should present the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolizerMode {
    /// Print a read-only crash report.
    Info,
    /// Drop into an interactive debugger.
    Debug,
}

impl SymbolizerMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            SymbolizerMode::Info => "info_corefile",
            SymbolizerMode::Debug => "dbg_corefile",
        }
    }
}

/// Turns a raw core file into something a human can read.
///
/// Implementations inherit the terminal; callers must hold a
/// [`CaptureSuspension`] while this runs.
pub trait Symbolizer: Send + Sync {
    fn run(&self, mode: SymbolizerMode, core: &Path) -> Result<(), SymbolizerError>;
}

/// ESP-IDF's `espcoredump.py`.
#[derive(Debug, Clone)]
pub struct EspCoredump {
    pub python: String,
    pub script: PathBuf,
    /// ELF matching the firmware that produced the dump.
    pub elf: PathBuf,
}

impl EspCoredump {
    /// Locate the script inside an IDF checkout.
    pub fn new(python: impl Into<String>, idf_path: &Path, elf: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: idf_path
                .join("components")
                .join("espcoredump")
                .join("espcoredump.py"),
            elf: elf.into(),
        }
    }

    pub fn command(&self, mode: SymbolizerMode, core: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.script)
            .arg(mode.as_arg())
            .arg(format!("--core={}", core.display()))
            .arg("--core-format=raw")
            .arg(&self.elf);
        cmd
    }
}

impl Symbolizer for EspCoredump {
    #[instrument(skip(self), fields(elf = %self.elf.display()))]
    fn run(&self, mode: SymbolizerMode, core: &Path) -> Result<(), SymbolizerError> {
        info!(mode = mode.as_arg(), "Running espcoredump");
        let status = self
            .command(mode, core)
            .status()
            .map_err(|source| SymbolizerError::Spawn {
                program: self.python.clone(),
                source,
            })?;
        if !status.success() {
            return Err(SymbolizerError::Failed(status));
        }
        Ok(())
    }
}
