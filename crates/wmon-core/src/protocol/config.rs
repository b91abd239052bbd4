//! Wi-Fi provisioning record.
//!
//! Fixed 99-byte layout: version (1) + SSID (33, NUL padded) +
//! password (64, NUL padded) + mode (1).

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} is {len} bytes, at most {max} fit in the record")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("Config payload too short: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Unknown Wi-Fi mode {0}")]
    UnknownMode(u8),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wi-Fi operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiMode {
    /// Join a known network, fall back to access point.
    #[default]
    Auto,
    Station,
    AccessPoint,
}

impl WifiMode {
    pub const fn as_u8(self) -> u8 {
        match self {
            WifiMode::Auto => 0,
            WifiMode::Station => 1,
            WifiMode::AccessPoint => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(WifiMode::Auto),
            1 => Ok(WifiMode::Station),
            2 => Ok(WifiMode::AccessPoint),
            other => Err(ConfigError::UnknownMode(other)),
        }
    }

    /// Parse an interactive answer: `a`/empty, `s` or `h`.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer {
            "" | "a" | "A" => Some(WifiMode::Auto),
            "s" | "S" => Some(WifiMode::Station),
            "h" | "H" => Some(WifiMode::AccessPoint),
            _ => None,
        }
    }
}

impl fmt::Display for WifiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiMode::Auto => write!(f, "auto"),
            WifiMode::Station => write!(f, "station"),
            WifiMode::AccessPoint => write!(f, "access point"),
        }
    }
}

/// Provisioning record exchanged with `get-config` / `set-config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub version: u8,
    pub ssid: String,
    pub password: String,
    pub mode: WifiMode,
}

impl HostConfig {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>, mode: WifiMode) -> Self {
        Self {
            version: HOST_CONFIG_VERSION,
            ssid: ssid.into(),
            password: password.into(),
            mode,
        }
    }

    /// Serialize the 99-byte record.
    ///
    /// The version byte is always [`HOST_CONFIG_VERSION`]: it describes the
    /// layout we write, not the one we may have read.
    pub fn encode_payload(&self) -> Result<Vec<u8>, ConfigError> {
        let mut buf = Vec::with_capacity(HOST_CONFIG_PAYLOAD_LEN);
        buf.write_u8(HOST_CONFIG_VERSION)?;
        write_padded(&mut buf, "ssid", &self.ssid, HOST_CONFIG_SSID_LEN - 1, HOST_CONFIG_SSID_LEN)?;
        write_padded(
            &mut buf,
            "password",
            &self.password,
            HOST_CONFIG_PASSWORD_LEN,
            HOST_CONFIG_PASSWORD_LEN,
        )?;
        buf.write_u8(self.mode.as_u8())?;
        debug_assert_eq!(buf.len(), HOST_CONFIG_PAYLOAD_LEN);
        Ok(buf)
    }

    /// Decode a record body (the bytes after the u16 length).
    pub fn decode_payload(data: &[u8]) -> Result<Self, ConfigError> {
        if data.len() < HOST_CONFIG_PAYLOAD_LEN {
            return Err(ConfigError::BufferTooSmall {
                expected: HOST_CONFIG_PAYLOAD_LEN,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let version = cursor.read_u8()?;
        let mut ssid = [0u8; HOST_CONFIG_SSID_LEN];
        cursor.read_exact(&mut ssid)?;
        let mut password = [0u8; HOST_CONFIG_PASSWORD_LEN];
        cursor.read_exact(&mut password)?;
        // The record was read in full; a mode from newer firmware is no
        // reason to drop the session.
        let mode = WifiMode::from_u8(cursor.read_u8()?).unwrap_or_else(|e| {
            warn!(error = %e, "Treating Wi-Fi mode as auto");
            WifiMode::Auto
        });
        Ok(Self {
            version,
            ssid: trim_nul(&ssid),
            password: trim_nul(&password),
            mode,
        })
    }

    /// Full `set-config` frame: opcode + u16 length + record.
    pub fn set_config_frame(&self) -> Result<Vec<u8>, ConfigError> {
        let payload = self.encode_payload()?;
        let mut frame = Vec::with_capacity(3 + payload.len());
        frame.write_u8(CMD_SET_CONFIG)?;
        frame.write_u16::<BigEndian>(payload.len() as u16)?;
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

fn write_padded(
    buf: &mut Vec<u8>,
    field: &'static str,
    value: &str,
    max: usize,
    width: usize,
) -> Result<(), ConfigError> {
    let bytes = value.as_bytes();
    if bytes.len() > max {
        return Err(ConfigError::FieldTooLong {
            field,
            len: bytes.len(),
            max,
        });
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (width - bytes.len()), 0);
    Ok(())
}

fn trim_nul(field: &[u8]) -> String {
    let start = field.iter().position(|&b| b != 0).unwrap_or(field.len());
    let end = field.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    String::from_utf8_lossy(&field[start..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let cfg = HostConfig::new("X", "Y", WifiMode::Station);
        let payload = cfg.encode_payload().unwrap();
        assert_eq!(payload.len(), HOST_CONFIG_PAYLOAD_LEN);

        let parsed = HostConfig::decode_payload(&payload).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.ssid, "X");
        assert_eq!(parsed.password, "Y");
        assert_eq!(parsed.mode, WifiMode::Station);
    }

    #[test]
    fn test_payload_length_is_fixed() {
        for (ssid, password) in [("", ""), ("a", "b"), (&"s".repeat(32)[..], &"p".repeat(64)[..])] {
            let cfg = HostConfig::new(ssid, password, WifiMode::Auto);
            assert_eq!(cfg.encode_payload().unwrap().len(), 99);
        }
    }

    #[test]
    fn test_layout_offsets() {
        let cfg = HostConfig::new("net", "secret", WifiMode::AccessPoint);
        let payload = cfg.encode_payload().unwrap();
        assert_eq!(payload[0], HOST_CONFIG_VERSION);
        assert_eq!(&payload[1..4], b"net");
        assert!(payload[4..34].iter().all(|&b| b == 0));
        assert_eq!(&payload[34..40], b"secret");
        assert_eq!(payload[98], 2);
    }

    #[test]
    fn test_set_config_frame_header() {
        let frame = HostConfig::new("a", "b", WifiMode::Auto)
            .set_config_frame()
            .unwrap();
        assert_eq!(frame[0], CMD_SET_CONFIG);
        assert_eq!(&frame[1..3], &[0, 99]);
        assert_eq!(frame.len(), 3 + 99);
    }

    #[test]
    fn test_oversized_ssid_rejected() {
        let cfg = HostConfig::new("s".repeat(33), "", WifiMode::Auto);
        assert!(matches!(
            cfg.encode_payload(),
            Err(ConfigError::FieldTooLong { field: "ssid", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert!(matches!(
            HostConfig::decode_payload(&[1, 2, 3]),
            Err(ConfigError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_unknown_mode_decodes_as_auto() {
        let mut payload = HostConfig::new("net", "pw", WifiMode::Station)
            .encode_payload()
            .unwrap();
        payload[98] = 7;
        let parsed = HostConfig::decode_payload(&payload).unwrap();
        assert_eq!(parsed.mode, WifiMode::Auto);
        assert_eq!(parsed.ssid, "net");
        assert!(matches!(WifiMode::from_u8(7), Err(ConfigError::UnknownMode(7))));
    }

    #[test]
    fn test_mode_answers() {
        assert_eq!(WifiMode::from_answer(""), Some(WifiMode::Auto));
        assert_eq!(WifiMode::from_answer("S"), Some(WifiMode::Station));
        assert_eq!(WifiMode::from_answer("h"), Some(WifiMode::AccessPoint));
        assert_eq!(WifiMode::from_answer("x"), None);
    }
}
