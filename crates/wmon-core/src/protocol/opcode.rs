//! Opcode parsing.
//!
//! Each frame on the link begins with one opcode byte. Values below 128
//! originate on the device, values from 128 up on the host; `Config`,
//! `Continue` and the core-dump opcodes travel both ways.

use std::fmt;

use super::constants::*;

/// Leading byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    PrintStdout,
    PrintStderr,
    Pong,
    OtaProgress,
    OtaSuccess,
    OtaFailed,
    Config,
    Ping,
    Reboot,
    Ota,
    Continue,
    CoredumpRead,
    CoredumpErase,
    GetConfig,
    SetConfig,
}

impl Opcode {
    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        match self {
            Opcode::PrintStdout => CMD_PRINT_STDOUT,
            Opcode::PrintStderr => CMD_PRINT_STDERR,
            Opcode::Pong => CMD_PONG,
            Opcode::OtaProgress => CMD_OTA_PROGRESS,
            Opcode::OtaSuccess => CMD_OTA_SUCCESS,
            Opcode::OtaFailed => CMD_OTA_FAILED,
            Opcode::Config => CMD_CONFIG,
            Opcode::Ping => CMD_PING,
            Opcode::Reboot => CMD_REBOOT,
            Opcode::Ota => CMD_OTA,
            Opcode::Continue => CMD_CONTINUE,
            Opcode::CoredumpRead => CMD_COREDUMP_READ,
            Opcode::CoredumpErase => CMD_COREDUMP_ERASE,
            Opcode::GetConfig => CMD_GET_CONFIG,
            Opcode::SetConfig => CMD_SET_CONFIG,
        }
    }

    /// Whether the device may send this opcode to us.
    pub fn is_inbound(self) -> bool {
        !matches!(
            self,
            Opcode::Ping | Opcode::Reboot | Opcode::Ota | Opcode::GetConfig | Opcode::SetConfig
        )
    }
}

impl TryFrom<u8> for Opcode {
    /// The unrecognized byte.
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            CMD_PRINT_STDOUT => Opcode::PrintStdout,
            CMD_PRINT_STDERR => Opcode::PrintStderr,
            CMD_PONG => Opcode::Pong,
            CMD_OTA_PROGRESS => Opcode::OtaProgress,
            CMD_OTA_SUCCESS => Opcode::OtaSuccess,
            CMD_OTA_FAILED => Opcode::OtaFailed,
            CMD_CONFIG => Opcode::Config,
            CMD_PING => Opcode::Ping,
            CMD_REBOOT => Opcode::Reboot,
            CMD_OTA => Opcode::Ota,
            CMD_CONTINUE => Opcode::Continue,
            CMD_COREDUMP_READ => Opcode::CoredumpRead,
            CMD_COREDUMP_ERASE => Opcode::CoredumpErase,
            CMD_GET_CONFIG => Opcode::GetConfig,
            CMD_SET_CONFIG => Opcode::SetConfig,
            other => return Err(other),
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op.as_u8()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::PrintStdout => "PRINT_STDOUT",
            Opcode::PrintStderr => "PRINT_STDERR",
            Opcode::Pong => "PONG",
            Opcode::OtaProgress => "OTA_PROGRESS",
            Opcode::OtaSuccess => "OTA_SUCCESS",
            Opcode::OtaFailed => "OTA_FAILED",
            Opcode::Config => "CONFIG",
            Opcode::Ping => "PING",
            Opcode::Reboot => "REBOOT",
            Opcode::Ota => "OTA",
            Opcode::Continue => "CONTINUE",
            Opcode::CoredumpRead => "COREDUMP_READ",
            Opcode::CoredumpErase => "COREDUMP_ERASE",
            Opcode::GetConfig => "GET_CONFIG",
            Opcode::SetConfig => "SET_CONFIG",
        };
        write!(f, "{}({})", name, self.as_u8())
    }
}
