//! Supervision loop: find the device, keep a session running, react to
//! keys, reconnect after failures.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};
use wmon_core::collab::prompt_until;
use wmon_core::discovery::Discovery;
use wmon_core::{
    Client, HostConfig, Prompter, ProjectInfo, SessionConfig, TerminalCapture, WifiMode,
};

use crate::console::{Console, ConsoleObserver};
use crate::event::{AppEvent, Command};

pub type ConsoleClient = Client<ConsoleObserver>;

/// How the session loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Exit {
    /// `q`, or the session closed cleanly.
    Quit,
    /// Ctrl-C.
    Interrupted,
}

pub struct App {
    config: SessionConfig,
    project: ProjectInfo,
    client: Arc<ConsoleClient>,
    discovery: Arc<dyn Discovery>,
    /// `None` when running unattended.
    prompter: Option<Arc<dyn Prompter>>,
    terminal: Arc<dyn TerminalCapture>,
    console: Console,
    events: (Sender<AppEvent>, Receiver<AppEvent>),
}

impl App {
    pub fn new(
        config: SessionConfig,
        project: ProjectInfo,
        client: Arc<ConsoleClient>,
        discovery: Arc<dyn Discovery>,
        prompter: Option<Arc<dyn Prompter>>,
        terminal: Arc<dyn TerminalCapture>,
        console: Console,
    ) -> Self {
        Self {
            config,
            project,
            client,
            discovery,
            prompter,
            terminal,
            console,
            events: mpsc::channel(),
        }
    }

    /// Sender for key events.
    pub fn sender(&self) -> Sender<AppEvent> {
        self.events.0.clone()
    }

    pub fn run(&self) -> Result<Exit> {
        let mut filter = self.config.host_filter.clone();
        loop {
            self.spawn_session(filter.clone());
            match self.wait_session()? {
                Some(exit) => return Ok(exit),
                None => {
                    // Pin the retry to the device we just lost.
                    filter = self.client.host().map(|h| h.name);
                    thread::sleep(self.config.reconnect_delay());
                }
            }
        }
    }

    fn spawn_session(&self, filter: Option<String>) {
        let client = Arc::clone(&self.client);
        let discovery = Arc::clone(&self.discovery);
        let sender = self.sender();
        thread::spawn(move || {
            let result = session(&client, discovery.as_ref(), filter.as_deref());
            // Nobody listening means the app is shutting down.
            let _ = sender.send(AppEvent::Session(result));
        });
    }

    /// Handle events until the current session ends. `None` asks for a
    /// reconnect.
    fn wait_session(&self) -> Result<Option<Exit>> {
        loop {
            let event = self.events.1.recv().context("event channel closed")?;
            match event {
                AppEvent::Key(key) => {
                    let Some(command) = Command::from_key(&key) else {
                        continue;
                    };
                    if let Some(exit) = self.execute(command) {
                        return Ok(Some(exit));
                    }
                }
                AppEvent::Session(Ok(())) => return Ok(Some(Exit::Quit)),
                AppEvent::Session(Err(e)) => {
                    let host = self.client.host();
                    match host {
                        Some(host) if self.config.interactive => {
                            warn!(error = %e, host = %host, "Session failed");
                            self.console.line(format_args!(
                                "disconnected from {}, trying to reconnect...",
                                host.name
                            ));
                            return Ok(None);
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    fn execute(&self, command: Command) -> Option<Exit> {
        info!(?command, "Key command");
        match command {
            Command::Interrupt => {
                self.close_client();
                return Some(Exit::Interrupted);
            }
            Command::Quit => {
                self.close_client();
                return Some(Exit::Quit);
            }
            Command::Configure => self.configure(),
            Command::Flash => self.flash(),
            Command::Reboot => {
                if let Err(e) = self.client.reboot() {
                    self.console.line(format_args!("error rebooting host: {e}"));
                }
            }
        }
        None
    }

    fn close_client(&self) {
        if let Err(e) = self.client.close() {
            warn!(error = %e, "Failed to close connection");
        }
    }

    /// Fetch the current config, let the user edit it, push it back.
    fn configure(&self) {
        let Some(prompter) = self.prompter.clone() else {
            return;
        };
        let client = Arc::downgrade(&self.client);
        let console = self.console.clone();
        let result = self.client.get_config(move |current| {
            if let Err(e) = edit_config(prompter.as_ref(), &client, current) {
                console.line(format_args!("error setting config: {e:#}"));
            }
        });
        if let Err(e) = result {
            self.console.line(format_args!("error requesting config: {e}"));
        }
    }

    /// Build and upload on a worker thread; the upload blocks for as
    /// long as pacing takes.
    fn flash(&self) {
        let bin = &self.project.app_bin;
        let name = bin.file_name().unwrap_or(bin.as_os_str()).to_string_lossy();
        self.console.line(format_args!("flashing {name} to host..."));

        let client = Arc::clone(&self.client);
        let project = self.project.clone();
        let terminal = Arc::clone(&self.terminal);
        let console = self.console.clone();
        thread::spawn(move || {
            let result = project
                .build(terminal.as_ref())
                .and_then(|()| Ok(client.flash(&project.app_bin)?));
            if let Err(e) = result {
                error!(error = %e, "Flash failed");
                console.line(format_args!("error flashing: {e:#}"));
            }
        });
    }
}

/// Resolve, connect and run one session.
fn session(client: &ConsoleClient, discovery: &dyn Discovery, filter: Option<&str>) -> Result<()> {
    let host = discovery.discover(filter)?;
    client.connect(&host)?;
    let result = client.run();
    if let Err(e) = client.close() {
        warn!(error = %e, "Failed to close connection");
    }
    Ok(result?)
}

fn edit_config(
    prompter: &dyn Prompter,
    client: &Weak<ConsoleClient>,
    current: HostConfig,
) -> Result<()> {
    let mode = prompt_until(
        prompter,
        "Select Wi-Fi mode [(A)uto/(s)tation/(h)ost]: ",
        WifiMode::from_answer,
    )?;
    let ssid = prompter.prompt("Enter Wi-Fi SSID: ")?;
    let password = prompter.prompt("Enter Wi-Fi Password: ")?;
    let updated = HostConfig {
        ssid,
        password,
        mode,
        ..current
    };
    let Some(client) = client.upgrade() else {
        bail!("client is gone");
    };
    client.set_config(&updated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmon_core::ScriptedPrompter;
    use wmon_core::{Host, KeepCoreDump, MockTransport, protocol::constants::CMD_SET_CONFIG};

    #[test]
    fn test_edit_config_sends_answers() {
        let console = Console::new(None);
        let client = Arc::new(Client::new(
            Default::default(),
            Arc::new(ConsoleObserver::new(console)),
            Arc::new(KeepCoreDump),
        ));
        let mock = MockTransport::new();
        client
            .attach(Host::new("esp", "mock"), Arc::new(mock.clone()))
            .unwrap();
        mock.clear_writes();

        let prompter = ScriptedPrompter::new(["x", "s", "home", "hunter2"]);
        edit_config(
            &prompter,
            &Arc::downgrade(&client),
            HostConfig::new("old", "old", WifiMode::Auto),
        )
        .unwrap();

        assert_eq!(prompter.asked().len(), 4);
        let frame = mock.written();
        assert_eq!(frame[0], CMD_SET_CONFIG);
        let sent = HostConfig::decode_payload(&frame[3..]).unwrap();
        assert_eq!(sent.ssid, "home");
        assert_eq!(sent.password, "hunter2");
        assert_eq!(sent.mode, WifiMode::Station);
    }

    #[test]
    fn test_edit_config_after_client_dropped() {
        let prompter = ScriptedPrompter::new(["", "a", "b"]);
        let client: Weak<ConsoleClient> = Weak::new();
        assert!(edit_config(&prompter, &client, HostConfig::default()).is_err());
    }
}
