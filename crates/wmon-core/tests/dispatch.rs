//! Drives the dispatch loop end to end through a scripted transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wmon_core::collab::{NoTerminal, ScriptedPrompter, Symbolizer, SymbolizerError, SymbolizerMode};
use wmon_core::coredump::{CoreDumpError, CoreDumpInspector, CoreDumpWorkflow, Disposition};
use wmon_core::events::RecordingObserver;
use wmon_core::protocol::constants::*;
use wmon_core::{
    Client, ClientConfig, ClientError, ClientEvent, Host, HostConfig, MockTransport, OutputStream,
    Pacing, TransportError, WifiMode,
};

/// Inspector returning a fixed answer and counting calls.
struct FixedInspector {
    answer: Disposition,
    calls: AtomicUsize,
}

impl FixedInspector {
    fn new(answer: Disposition) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }
}

impl CoreDumpInspector for FixedInspector {
    fn inspect(&self, _dump: &[u8]) -> Result<Disposition, CoreDumpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

/// Captures the core file contents when asked to symbolize it.
#[derive(Default)]
struct CapturingSymbolizer {
    seen: Mutex<Vec<Vec<u8>>>,
}

impl Symbolizer for CapturingSymbolizer {
    fn run(&self, _mode: SymbolizerMode, core: &std::path::Path) -> Result<(), SymbolizerError> {
        let bytes = std::fs::read(core).map_err(SymbolizerError::Terminal)?;
        self.seen.lock().unwrap().push(bytes);
        Ok(())
    }
}

struct Harness {
    client: Arc<Client<RecordingObserver>>,
    mock: MockTransport,
    observer: Arc<RecordingObserver>,
}

impl Harness {
    fn new(inspector: Arc<dyn CoreDumpInspector>) -> Self {
        let config = ClientConfig {
            pacing: Pacing {
                chunk_size: 100 * 1024,
                interval: Duration::ZERO,
            },
            ..Default::default()
        };
        let observer = Arc::new(RecordingObserver::new());
        let client = Arc::new(Client::new(config, observer.clone(), inspector));
        let mock = MockTransport::new();
        client
            .attach(Host::new("esp32", "mock"), Arc::new(mock.clone()))
            .unwrap();
        Self {
            client,
            mock,
            observer,
        }
    }

    fn plain() -> Self {
        Self::new(FixedInspector::new(Disposition::Ignore))
    }

    /// Run until the script is exhausted and the second timeout ends the loop.
    fn run_to_timeout(&self) {
        match self.client.run() {
            Err(ClientError::Transport(TransportError::Timeout { .. })) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.mock.get_writes()
    }

    fn events(&self) -> Vec<ClientEvent> {
        self.observer.events()
    }
}

fn blob32(op: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![op];
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(data);
    frame
}

fn config_frame(cfg: &HostConfig) -> Vec<u8> {
    let payload = cfg.encode_payload().unwrap();
    let mut frame = vec![CMD_CONFIG];
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

#[test]
fn empty_coredump_answers_continue() {
    let inspector = FixedInspector::new(Disposition::Delete);
    let h = Harness::new(inspector.clone());
    h.mock.queue_bytes(&blob32(CMD_COREDUMP_READ, &[]));

    h.run_to_timeout();

    assert_eq!(
        h.writes(),
        vec![vec![CMD_COREDUMP_READ], vec![CMD_CONTINUE], vec![CMD_PING]]
    );
    assert_eq!(inspector.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn deleted_coredump_is_erased_then_continued() {
    let inspector = FixedInspector::new(Disposition::Delete);
    let h = Harness::new(inspector.clone());
    h.mock.queue_bytes(&blob32(CMD_COREDUMP_READ, &[1, 2, 3, 4, 5, 6]));
    h.mock.queue_bytes(&[CMD_COREDUMP_ERASE]);

    h.run_to_timeout();

    assert_eq!(inspector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.writes(),
        vec![
            vec![CMD_COREDUMP_READ],
            vec![CMD_COREDUMP_ERASE],
            vec![CMD_CONTINUE],
            vec![CMD_PING]
        ]
    );
    assert!(h.events().contains(&ClientEvent::CoreDumpFound { len: 6 }));
}

#[test]
fn viewed_coredump_artifact_is_trailing_bytes() {
    let symbolizer = Arc::new(CapturingSymbolizer::default());
    let workflow = CoreDumpWorkflow::new(
        Arc::new(ScriptedPrompter::new(["v"])),
        symbolizer.clone(),
        Arc::new(NoTerminal),
    );
    let h = Harness::new(Arc::new(workflow));
    let mut dump = vec![0xDE, 0xAD, 0xBE, 0xEF];
    dump.extend((0u8..200).collect::<Vec<_>>());
    h.mock.queue_bytes(&blob32(CMD_COREDUMP_READ, &dump));

    h.run_to_timeout();

    let seen = symbolizer.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (0u8..200).collect::<Vec<_>>());
    // Kept on the device.
    assert_eq!(h.writes()[1], vec![CMD_CONTINUE]);
}

#[test]
fn failed_inspection_keeps_dump() {
    // No answers scripted: the prompt fails.
    let workflow = CoreDumpWorkflow::new(
        Arc::new(ScriptedPrompter::new(Vec::<String>::new())),
        Arc::new(CapturingSymbolizer::default()),
        Arc::new(NoTerminal),
    );
    let h = Harness::new(Arc::new(workflow));
    h.mock.queue_bytes(&blob32(CMD_COREDUMP_READ, &[0; 16]));

    h.run_to_timeout();

    assert_eq!(h.writes()[1], vec![CMD_CONTINUE]);
    assert!(
        h.events()
            .iter()
            .any(|e| matches!(e, ClientEvent::CoreDumpError { .. }))
    );
}

#[test]
fn unsolicited_config_triggers_reboot() {
    let h = Harness::plain();
    h.mock.queue_bytes(&[CMD_CONFIG, 0, 0]);

    h.run_to_timeout();

    assert_eq!(h.writes()[1], vec![CMD_REBOOT]);
    assert!(h.events().contains(&ClientEvent::Rebooting {
        host: "esp32".into()
    }));
}

#[test]
fn pending_config_callback_runs_once() {
    let h = Harness::plain();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    h.client
        .get_config(move |cfg| sink.lock().unwrap().push(cfg))
        .unwrap();

    let cfg = HostConfig::new("X", "Y", WifiMode::Station);
    h.mock.queue_bytes(&config_frame(&cfg));
    // Second response finds no callback and reboots.
    h.mock.queue_bytes(&config_frame(&cfg));

    h.run_to_timeout();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].ssid, "X");
    assert_eq!(received[0].password, "Y");
    assert_eq!(received[0].mode, WifiMode::Station);
    assert_eq!(
        h.writes(),
        vec![
            vec![CMD_COREDUMP_READ],
            vec![CMD_GET_CONFIG],
            vec![CMD_REBOOT],
            vec![CMD_PING]
        ]
    );
}

#[test]
fn second_get_config_replaces_first() {
    let h = Harness::plain();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let first = hits.clone();
    let second = hits.clone();
    h.client
        .get_config(move |_| first.lock().unwrap().push("first"))
        .unwrap();
    h.client
        .get_config(move |_| second.lock().unwrap().push("second"))
        .unwrap();
    h.mock.queue_bytes(&config_frame(&HostConfig::default()));

    h.run_to_timeout();

    assert_eq!(*hits.lock().unwrap(), vec!["second"]);
}

#[test]
fn log_passthrough_and_unknown_opcodes() {
    let h = Harness::plain();
    h.mock.queue_bytes(&blob32(CMD_PRINT_STDOUT, b"hello\n"));
    h.mock.queue_bytes(&[42]);
    h.mock.queue_bytes(&blob32(CMD_PRINT_STDERR, b"oops\n"));
    h.mock.queue_bytes(&[CMD_PONG, CMD_CONTINUE]);

    h.run_to_timeout();

    let events = h.events();
    assert!(events.contains(&ClientEvent::Output {
        stream: OutputStream::Stdout,
        text: "hello\n".into()
    }));
    assert!(events.contains(&ClientEvent::UnknownCommand { opcode: 42 }));
    assert!(events.contains(&ClientEvent::Output {
        stream: OutputStream::Stderr,
        text: "oops\n".into()
    }));
    assert!(events.contains(&ClientEvent::DeviceContinued));
}

#[test]
fn ota_progress_and_success() {
    let h = Harness::plain();
    h.client.flash_image(&[0u8; 100]).unwrap();

    let mut progress = vec![CMD_OTA_PROGRESS];
    progress.extend_from_slice(&50u32.to_be_bytes());
    h.mock.queue_bytes(&progress);
    // Suppressed while the transfer is active.
    h.mock.queue_bytes(&blob32(CMD_PRINT_STDOUT, b"noise"));
    h.mock.queue_bytes(&[CMD_OTA_SUCCESS]);
    h.mock.queue_bytes(&blob32(CMD_PRINT_STDOUT, b"booted"));

    h.run_to_timeout();

    let events = h.events();
    assert!(events.contains(&ClientEvent::OtaProgress {
        offset: 50,
        total: 100,
        percentage: 50
    }));
    assert!(events.contains(&ClientEvent::OtaFinished { success: true }));
    let outputs: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Output { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(outputs, vec!["booted"]);
    assert!(!h.client.is_flashing_ota());
}

#[test]
fn ota_failure_reported_once() {
    let h = Harness::plain();
    h.client.flash_image(&[0u8; 8]).unwrap();
    h.mock.queue_bytes(&[CMD_OTA_FAILED, CMD_OTA_FAILED]);

    h.run_to_timeout();

    let finished = h
        .events()
        .iter()
        .filter(|e| matches!(e, ClientEvent::OtaFinished { success: false }))
        .count();
    assert_eq!(finished, 1);
}

#[test]
fn stray_progress_is_drained() {
    let h = Harness::plain();
    let mut progress = vec![CMD_OTA_PROGRESS];
    // Offset bytes that would otherwise parse as a pong.
    progress.extend_from_slice(&[0, 0, 0, CMD_PONG]);
    h.mock.queue_bytes(&progress);
    h.mock.queue_bytes(&blob32(CMD_PRINT_STDOUT, b"after"));

    h.run_to_timeout();

    let events = h.events();
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ClientEvent::OtaProgress { .. }))
    );
    assert!(events.contains(&ClientEvent::Output {
        stream: OutputStream::Stdout,
        text: "after".into()
    }));
}

#[test]
fn timeouts_tolerated_while_flashing() {
    let h = Harness::plain();
    h.client.flash_image(&[0u8; 8]).unwrap();
    for _ in 0..5 {
        h.mock.queue_timeout();
    }
    h.mock.queue_bytes(&[CMD_OTA_SUCCESS]);

    h.run_to_timeout();

    let pings = h.writes().iter().filter(|w| **w == [CMD_PING]).count();
    assert_eq!(pings, 1);
}

#[test]
fn pong_resets_timeout_streak() {
    let h = Harness::plain();
    for _ in 0..3 {
        h.mock.queue_timeout();
        h.mock.queue_bytes(&[CMD_PONG]);
    }

    h.run_to_timeout();

    let pings = h.writes().iter().filter(|w| **w == [CMD_PING]).count();
    assert_eq!(pings, 4);
}

#[test]
fn peer_close_ends_session_with_error() {
    let h = Harness::plain();
    h.mock.queue_eof();

    assert!(matches!(
        h.client.run(),
        Err(ClientError::Transport(TransportError::Disconnected))
    ));
    assert!(h.events().contains(&ClientEvent::Disconnected {
        host: "esp32".into()
    }));
}

#[test]
fn unknown_mode_still_answers_pending_request() {
    let h = Harness::plain();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    h.client
        .get_config(move |cfg| sink.lock().unwrap().push(cfg))
        .unwrap();
    let mut frame = config_frame(&HostConfig::new("X", "Y", WifiMode::Station));
    *frame.last_mut().unwrap() = 9;
    h.mock.queue_bytes(&frame);

    h.run_to_timeout();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].ssid, "X");
    assert_eq!(received[0].mode, WifiMode::Auto);
}

#[test]
fn host_only_opcode_from_device_is_unknown() {
    let h = Harness::plain();
    h.mock.queue_bytes(&[CMD_PING, CMD_SET_CONFIG]);
    h.mock.queue_bytes(&blob32(CMD_PRINT_STDOUT, b"still here"));

    h.run_to_timeout();

    let events = h.events();
    assert!(events.contains(&ClientEvent::UnknownCommand { opcode: CMD_PING }));
    assert!(events.contains(&ClientEvent::UnknownCommand {
        opcode: CMD_SET_CONFIG
    }));
    assert!(events.contains(&ClientEvent::Output {
        stream: OutputStream::Stdout,
        text: "still here".into()
    }));
}

#[test]
fn malformed_config_is_fatal() {
    let h = Harness::plain();
    h.mock.queue_bytes(&[CMD_CONFIG, 0, 3, 1, 2, 3]);

    assert!(matches!(h.client.run(), Err(ClientError::Config(_))));
}

#[test]
fn local_close_ends_loop_cleanly() {
    let h = Harness::plain();
    h.mock.wait_when_empty(true);

    let client = h.client.clone();
    let runner = thread::spawn(move || client.run());
    thread::sleep(Duration::from_millis(100));
    h.client.close().unwrap();

    assert!(runner.join().unwrap().is_ok());
    assert!(h.mock.is_closed());
    assert!(h.client.send(wmon_core::Opcode::Ping).is_err());
}

#[test]
fn run_without_connection_returns_immediately() {
    let client = Client::new(
        ClientConfig::default(),
        Arc::new(RecordingObserver::new()),
        FixedInspector::new(Disposition::Ignore),
    );
    assert!(client.run().is_ok());
}
