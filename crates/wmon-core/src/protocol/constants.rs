//! Protocol constants shared with the device firmware.
//!
//! Every frame starts with a single opcode byte; multi-byte integers are
//! big-endian.

use std::time::Duration;

// ============================================================================
// Opcodes (Device -> Host)
// ============================================================================

pub const CMD_PRINT_STDOUT: u8 = 0;
pub const CMD_PRINT_STDERR: u8 = 1;
pub const CMD_PONG: u8 = 5;
pub const CMD_OTA_PROGRESS: u8 = 6;
pub const CMD_OTA_SUCCESS: u8 = 7;
pub const CMD_OTA_FAILED: u8 = 8;
/// Bidirectional: config response from the device.
pub const CMD_CONFIG: u8 = 9;

// ============================================================================
// Opcodes (Host -> Device)
// ============================================================================

pub const CMD_PING: u8 = 128;
pub const CMD_REBOOT: u8 = 129;
pub const CMD_OTA: u8 = 130;
/// Bidirectional.
pub const CMD_CONTINUE: u8 = 131;
/// Bidirectional: request from host, u32-prefixed blob from device.
pub const CMD_COREDUMP_READ: u8 = 132;
/// Bidirectional: request from host, bare ack from device.
pub const CMD_COREDUMP_ERASE: u8 = 133;
pub const CMD_GET_CONFIG: u8 = 134;
pub const CMD_SET_CONFIG: u8 = 135;

// ============================================================================
// Host config record layout
// ============================================================================

/// Layout version written into every config record we send.
pub const HOST_CONFIG_VERSION: u8 = 1;
/// SSID field width on the wire (32 chars + NUL).
pub const HOST_CONFIG_SSID_LEN: usize = 33;
/// Password field width on the wire.
pub const HOST_CONFIG_PASSWORD_LEN: usize = 64;
/// version + ssid + password + mode
pub const HOST_CONFIG_PAYLOAD_LEN: usize = 1 + HOST_CONFIG_SSID_LEN + HOST_CONFIG_PASSWORD_LEN + 1;

// ============================================================================
// Core dumps
// ============================================================================

/// Length of the magic number prefixed to every stored core dump.
pub const COREDUMP_MAGIC_LEN: usize = 4;

// ============================================================================
// Timing & flow control
// ============================================================================

/// Deadline for the opcode byte in the dispatch loop.
pub const OPCODE_READ_TIMEOUT: Duration = Duration::from_millis(300);
/// Deadline for typed field reads (lengths, offsets, config fields).
pub const FIELD_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Deadline for stdout/stderr passthrough blobs.
pub const TEXT_READ_TIMEOUT: Duration = Duration::from_secs(3);
/// Silence after which an OTA transfer stops counting as active.
pub const OTA_ACTIVITY_WINDOW: Duration = Duration::from_secs(5);

/// Largest slice handed to the socket in one write (100 KiB).
pub const WRITE_CHUNK_SIZE: usize = 100 * 1024;
/// Pause between consecutive chunks; caps throughput at ~100 KiB/s.
pub const WRITE_CHUNK_INTERVAL: Duration = Duration::from_millis(1000);

/// mDNS service type advertised by the firmware.
pub const SERVICE_TYPE: &str = "_esp32wmonitor._tcp";
