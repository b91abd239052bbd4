//! Events driving the supervision loop.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Everything the main loop waits on, from one channel.
#[derive(Debug)]
pub enum AppEvent {
    /// Key pressed while the keyboard was captured.
    Key(KeyEvent),
    /// A device session ended; `Ok` means it was closed on purpose.
    Session(anyhow::Result<()>),
}

/// Single-key commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Configure,
    Flash,
    Reboot,
    Quit,
    Interrupt,
}

impl Command {
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Command::Interrupt),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Char('c') => Some(Command::Configure),
            KeyCode::Char('f') => Some(Command::Flash),
            KeyCode::Char('r') => Some(Command::Reboot),
            KeyCode::Char('q') => Some(Command::Quit),
            _ => None,
        }
    }
}
