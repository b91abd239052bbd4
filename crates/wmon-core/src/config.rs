//! Session configuration.
//!
//! Loaded from an optional TOML file and overlaid with command-line
//! arguments by the CLI.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::discovery::Host;
use crate::protocol::constants::*;
use crate::transport::Pacing;

/// Timing and flow-control knobs for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for each opcode byte.
    #[serde(with = "millis")]
    pub opcode_timeout: Duration,
    /// Deadline for typed field reads.
    #[serde(with = "millis")]
    pub field_timeout: Duration,
    /// Deadline for text passthrough blobs.
    #[serde(with = "millis")]
    pub text_timeout: Duration,
    /// Silence after which an OTA transfer is no longer active.
    #[serde(with = "millis")]
    pub ota_window: Duration,
    pub pacing: Pacing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            opcode_timeout: OPCODE_READ_TIMEOUT,
            field_timeout: FIELD_READ_TIMEOUT,
            text_timeout: TEXT_READ_TIMEOUT,
            ota_window: OTA_ACTIVITY_WINDOW,
            pacing: Pacing::default(),
        }
    }
}

/// Configuration for a monitor session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Project directory.
    pub project_path: String,
    /// Makefiles to resolve build variables from, relative to the project.
    pub makefiles: Vec<String>,
    /// Substring a device name must contain.
    pub host_filter: Option<String>,
    /// Prompt the user and reconnect after failures.
    pub interactive: bool,
    /// Known devices.
    pub hosts: Vec<Host>,
    /// Override for `$IDF_PATH`.
    pub idf_path: Option<String>,
    /// Override for `$APP_ELF`.
    pub app_elf: Option<String>,
    /// Override for `$APP_BIN`.
    pub app_bin: Option<String>,
    /// Python interpreter used for `espcoredump.py`.
    pub python: String,
    /// Pause before trying to reconnect.
    pub reconnect_delay_ms: u64,
    pub client: ClientConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project_path: ".".to_string(),
            makefiles: vec!["Makefile".to_string()],
            host_filter: None,
            interactive: true,
            hosts: Vec::new(),
            idf_path: None,
            app_elf: None,
            app_bin: None,
            python: "python".to_string(),
            reconnect_delay_ms: 1000,
            client: ClientConfig::default(),
        }
    }
}

/// Values supplied on the command line; `None` keeps the file's value.
#[derive(Debug, Default, Clone)]
pub struct SessionOverrides {
    pub project_path: Option<String>,
    pub makefiles: Option<Vec<String>>,
    pub host_filter: Option<String>,
    pub addr: Option<String>,
    pub non_interactive: bool,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay command-line values.
    ///
    /// An explicit address becomes a configured host named after the
    /// filter (or the address itself) so discovery can pick it up.
    pub fn merge(mut self, overrides: SessionOverrides) -> Self {
        if let Some(path) = overrides.project_path {
            self.project_path = path;
        }
        if let Some(makefiles) = overrides.makefiles {
            self.makefiles = makefiles;
        }
        if overrides.host_filter.is_some() {
            self.host_filter = overrides.host_filter;
        }
        if overrides.non_interactive {
            self.interactive = false;
        }
        if let Some(addr) = overrides.addr {
            let name = self.host_filter.clone().unwrap_or_else(|| addr.clone());
            self.hosts.insert(0, Host::new(name, addr));
        }
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Serde helpers storing a `Duration` as whole milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.opcode_timeout, Duration::from_millis(300));
        assert_eq!(cfg.field_timeout, Duration::from_secs(1));
        assert_eq!(cfg.text_timeout, Duration::from_secs(3));
        assert_eq!(cfg.ota_window, Duration::from_secs(5));
        assert_eq!(cfg.pacing.chunk_size, 100 * 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: SessionConfig = toml::from_str(
            r#"
            host_filter = "kitchen"

            [[hosts]]
            name = "kitchen-esp"
            addr = "192.168.1.20:4242"

            [client]
            opcode_timeout = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.host_filter.as_deref(), Some("kitchen"));
        assert_eq!(cfg.hosts.len(), 1);
        assert_eq!(cfg.client.opcode_timeout, Duration::from_millis(500));
        assert_eq!(cfg.client.text_timeout, Duration::from_secs(3));
        assert_eq!(cfg.makefiles, vec!["Makefile"]);
        assert!(cfg.interactive);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wmon.toml");
        let mut cfg = SessionConfig::default();
        cfg.app_bin = Some("build/app.bin".into());
        cfg.save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), cfg);
    }

    #[test]
    fn test_merge_overrides() {
        let cfg = SessionConfig::default().merge(SessionOverrides {
            project_path: Some("/src/app".into()),
            host_filter: Some("esp".into()),
            addr: Some("10.0.0.2:4242".into()),
            non_interactive: true,
            ..Default::default()
        });
        assert_eq!(cfg.project_path, "/src/app");
        assert!(!cfg.interactive);
        assert_eq!(cfg.hosts[0], Host::new("esp", "10.0.0.2:4242"));
    }
}
