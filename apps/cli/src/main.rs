//! wmon - console for wmonitor devices.
//!
//! Streams the device's logs, and while the keyboard is captured accepts
//! single-key commands: `c` configure Wi-Fi, `f` build and flash, `r`
//! reboot, `q` quit.

mod app;
mod console;
mod event;
mod terminal;

use std::fs::OpenOptions;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::terminal::disable_raw_mode;
use tracing::{error, info};
use wmon_core::{
    Client, CoreDumpInspector, CoreDumpWorkflow, EspCoredump, KeepCoreDump, MakeVariables,
    NoTerminal, ProjectInfo, Prompter, SessionConfig, SessionOverrides, StaticDiscovery,
    TerminalCapture,
};

use app::{App, Exit};
use console::{Console, ConsoleObserver};
use terminal::{KeyboardMonitor, LinePrompter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Console for wmonitor devices", long_about = None)]
struct Args {
    /// Path to the project directory
    #[arg(short = 'p', long = "project")]
    project: Option<String>,

    /// Device to connect to (substring of its name), any if empty
    #[arg(long)]
    host: Option<String>,

    /// Device address (ip:port), instead of looking it up
    #[arg(long)]
    addr: Option<String>,

    /// Non interactive
    #[arg(short = 'n')]
    non_interactive: bool,

    /// Makefiles to load the app information from, relative to the project
    #[arg(short = 'm', long = "makefiles", value_delimiter = ',')]
    makefiles: Option<Vec<String>>,

    /// Session config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log file used while the keyboard is captured
    #[arg(long, default_value = "wmon.log")]
    log_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> SessionOverrides {
        SessionOverrides {
            project_path: self.project.clone(),
            makefiles: self.makefiles.clone(),
            host_filter: self.host.clone(),
            addr: self.addr.clone(),
            non_interactive: self.non_interactive,
        }
    }
}

fn init_logging(args: &Args, interactive: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(if args.verbose {
            tracing::Level::DEBUG.into()
        } else {
            tracing::Level::INFO.into()
        })
        .from_env_lossy();
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // The raw terminal belongs to the device output.
    if interactive {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&args.log_file)
            .with_context(|| format!("opening log file {}", args.log_file.display()))?;
        tracing::subscriber::set_global_default(
            builder.with_ansi(false).with_writer(Mutex::new(file)).finish(),
        )?;
    } else {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let base = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    Ok(base.merge(args.overrides()))
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(Exit::Quit) => ExitCode::SUCCESS,
        Ok(Exit::Interrupted) => ExitCode::from(130),
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<Exit> {
    let config = load_config(&args)?;
    init_logging(&args, config.interactive)?;
    info!(project = %config.project_path, interactive = config.interactive, "Starting wmon");

    let project = ProjectInfo::resolve(&config, &MakeVariables::default())?;

    let monitor = if config.interactive {
        // Put the terminal back if anything panics while raw.
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let _ = disable_raw_mode();
            original_hook(panic_info);
        }));
        Some(KeyboardMonitor::open().context("capturing keyboard")?)
    } else {
        None
    };

    let console = Console::new(monitor.clone());
    let terminal: Arc<dyn TerminalCapture> = match &monitor {
        Some(m) => m.clone(),
        None => Arc::new(NoTerminal),
    };
    let prompter: Option<Arc<dyn Prompter>> = monitor
        .as_ref()
        .map(|_| Arc::new(LinePrompter::new(terminal.clone())) as Arc<dyn Prompter>);

    let inspector: Arc<dyn CoreDumpInspector> = match &prompter {
        Some(prompter) => Arc::new(CoreDumpWorkflow::new(
            prompter.clone(),
            Arc::new(EspCoredump::new(
                config.python.clone(),
                &project.idf_path,
                project.app_elf.clone(),
            )),
            terminal.clone(),
        )),
        None => Arc::new(KeepCoreDump),
    };

    let client = Arc::new(Client::new(
        config.client,
        Arc::new(ConsoleObserver::new(console.clone())),
        inspector,
    ));
    let discovery = Arc::new(StaticDiscovery::new(config.hosts.clone(), prompter.clone()));

    let app = App::new(config, project, client, discovery, prompter, terminal, console);
    if let Some(monitor) = &monitor {
        monitor.spawn_reader(app.sender());
    }

    let result = app.run();

    if let Some(monitor) = &monitor {
        monitor.close()?;
    }
    result
}
