//! Core-dump retrieval workflow.
//!
//! The device answers the post-connect probe with whatever dump it has
//! stored. A non-empty dump is written to a temporary file (minus its
//! magic number), the user picks what to do with it, and the answer
//! decides whether the device erases its copy.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::collab::{
    CaptureSuspension, Prompter, Symbolizer, SymbolizerError, SymbolizerMode, TerminalCapture,
    prompt_until,
};
use crate::protocol::constants::COREDUMP_MAGIC_LEN;

const DISPOSITION_PROMPT: &str =
    "Select what do to with this coredump [(V)iew/(g)db/(d)elete/(i)gnore]: ";

#[derive(Error, Debug)]
pub enum CoreDumpError {
    #[error("core dump of {len} bytes is shorter than its magic number")]
    Truncated { len: usize },
    #[error("failed to write core file: {0}")]
    Artifact(#[source] io::Error),
    #[error("failed to read answer: {0}")]
    Prompt(#[source] io::Error),
    #[error("failed to hand over the terminal: {0}")]
    Terminal(#[source] io::Error),
    #[error(transparent)]
    Symbolizer(#[from] SymbolizerError),
}

/// What the user wants done with a retrieved dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Print the crash report.
    View,
    /// Open the dump in the debugger.
    Debug,
    /// Erase it from the device.
    Delete,
    /// Leave it on the device.
    Ignore,
}

impl Disposition {
    /// Parse an answer to the disposition prompt; empty means view.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer {
            "" | "v" | "V" => Some(Disposition::View),
            "g" | "G" => Some(Disposition::Debug),
            "d" | "D" => Some(Disposition::Delete),
            "i" | "I" => Some(Disposition::Ignore),
            _ => None,
        }
    }

    /// Whether the device should be told to erase its copy.
    pub fn erase_on_device(self) -> bool {
        self == Disposition::Delete
    }
}

/// Decides what happens to a retrieved dump.
pub trait CoreDumpInspector: Send + Sync {
    /// Handle the raw dump as received (magic number included).
    fn inspect(&self, dump: &[u8]) -> Result<Disposition, CoreDumpError>;
}

/// Inspector for unattended runs: the dump stays on the device.
pub struct KeepCoreDump;

impl CoreDumpInspector for KeepCoreDump {
    fn inspect(&self, dump: &[u8]) -> Result<Disposition, CoreDumpError> {
        info!(len = dump.len(), "Leaving core dump on device");
        Ok(Disposition::Ignore)
    }
}

/// Write the dump without its magic number to a temporary `core.*` file.
///
/// The file is removed when the returned handle is dropped.
pub fn write_artifact(dump: &[u8]) -> Result<NamedTempFile, CoreDumpError> {
    let core = dump
        .get(COREDUMP_MAGIC_LEN..)
        .ok_or(CoreDumpError::Truncated { len: dump.len() })?;
    let mut file = tempfile::Builder::new()
        .prefix("core.")
        .tempfile()
        .map_err(CoreDumpError::Artifact)?;
    file.write_all(core).map_err(CoreDumpError::Artifact)?;
    file.flush().map_err(CoreDumpError::Artifact)?;
    debug!(path = %file.path().display(), len = core.len(), "Core file written");
    Ok(file)
}

/// Interactive workflow: persist, ask, symbolize.
pub struct CoreDumpWorkflow {
    prompter: Arc<dyn Prompter>,
    symbolizer: Arc<dyn Symbolizer>,
    terminal: Arc<dyn TerminalCapture>,
}

impl CoreDumpWorkflow {
    pub fn new(
        prompter: Arc<dyn Prompter>,
        symbolizer: Arc<dyn Symbolizer>,
        terminal: Arc<dyn TerminalCapture>,
    ) -> Self {
        Self {
            prompter,
            symbolizer,
            terminal,
        }
    }

    fn symbolize(&self, mode: SymbolizerMode, core: &Path) -> Result<(), CoreDumpError> {
        let _terminal =
            CaptureSuspension::acquire(self.terminal.as_ref()).map_err(CoreDumpError::Terminal)?;
        self.symbolizer.run(mode, core)?;
        Ok(())
    }
}

impl CoreDumpInspector for CoreDumpWorkflow {
    #[instrument(skip_all, fields(len = dump.len()))]
    fn inspect(&self, dump: &[u8]) -> Result<Disposition, CoreDumpError> {
        let artifact = write_artifact(dump)?;
        let disposition = prompt_until(self.prompter.as_ref(), DISPOSITION_PROMPT, |answer| {
            Disposition::from_answer(answer)
        })
        .map_err(CoreDumpError::Prompt)?;
        info!(?disposition, "Core dump disposition");

        match disposition {
            Disposition::View => self.symbolize(SymbolizerMode::Info, artifact.path())?,
            Disposition::Debug => self.symbolize(SymbolizerMode::Debug, artifact.path())?,
            Disposition::Delete | Disposition::Ignore => {}
        }
        Ok(disposition)
    }
}
