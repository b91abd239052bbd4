//! Protocol module - wire definitions for the wmonitor link.

pub mod config;
pub mod constants;
pub mod frame;
pub mod opcode;

pub use config::{ConfigError, HostConfig, WifiMode};
pub use constants::*;
pub use frame::{ota_frame, single_byte};
pub use opcode::Opcode;
