//! Device discovery.
//!
//! Resolving a device name into an address is a collaborator concern;
//! the firmware advertises itself as [`SERVICE_TYPE`](crate::protocol::SERVICE_TYPE).
//! `StaticDiscovery` resolves against a list of known devices.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::collab::{Prompter, prompt_until};

/// A resolved device endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Device (host) name.
    pub name: String,
    /// `ip:port`
    pub addr: String,
}

impl Host {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.addr)
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no device matches {0:?}")]
    NoMatch(Option<String>),
    #[error("failed to read selection: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Finds the device to talk to.
pub trait Discovery: Send + Sync {
    /// Resolve a device whose name contains `filter` (any device if `None`).
    fn discover(&self, filter: Option<&str>) -> Result<Host, DiscoveryError>;
}

/// Discovery over a fixed list of devices.
pub struct StaticDiscovery {
    hosts: Vec<Host>,
    /// Asks which device to use when several match; `None` picks the first.
    prompter: Option<Arc<dyn Prompter>>,
}

impl StaticDiscovery {
    pub fn new(hosts: Vec<Host>, prompter: Option<Arc<dyn Prompter>>) -> Self {
        Self { hosts, prompter }
    }

    fn select(&self, candidates: Vec<&Host>) -> Result<Host, DiscoveryError> {
        let Some(prompter) = &self.prompter else {
            return Ok(candidates[0].clone());
        };
        let mut message = format!("found {} hosts\n", candidates.len());
        for (i, host) in candidates.iter().enumerate() {
            message.push_str(&format!("[{}]\t {}\n", i + 1, host.name));
        }
        message.push_str(&format!("select an entry [1-{}]: ", candidates.len()));
        let index = prompt_until(prompter.as_ref(), &message, |answer| {
            answer
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=candidates.len()).contains(n))
        })?;
        Ok(candidates[index - 1].clone())
    }
}

impl Discovery for StaticDiscovery {
    fn discover(&self, filter: Option<&str>) -> Result<Host, DiscoveryError> {
        let candidates: Vec<&Host> = self
            .hosts
            .iter()
            .filter(|h| filter.is_none_or(|f| h.name.contains(f)))
            .collect();
        debug!(filter = ?filter, matches = candidates.len(), "Resolving host");
        let host = match candidates.len() {
            0 => return Err(DiscoveryError::NoMatch(filter.map(str::to_string))),
            1 => candidates[0].clone(),
            _ => self.select(candidates)?,
        };
        info!(host = %host, "Host resolved");
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::ScriptedPrompter;

    fn hosts() -> Vec<Host> {
        vec![
            Host::new("kitchen-esp", "10.0.0.1:4242"),
            Host::new("garage-esp", "10.0.0.2:4242"),
            Host::new("garden", "10.0.0.3:4242"),
        ]
    }

    #[test]
    fn test_single_match_needs_no_prompt() {
        let prompter = Arc::new(ScriptedPrompter::new(Vec::<String>::new()));
        let discovery = StaticDiscovery::new(hosts(), Some(prompter.clone()));
        let host = discovery.discover(Some("garage")).unwrap();
        assert_eq!(host.addr, "10.0.0.2:4242");
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_multiple_matches_prompt() {
        let prompter = Arc::new(ScriptedPrompter::new(["9", "x", "2"]));
        let discovery = StaticDiscovery::new(hosts(), Some(prompter.clone()));
        let host = discovery.discover(Some("esp")).unwrap();
        assert_eq!(host.name, "garage-esp");
        assert_eq!(prompter.asked().len(), 3);
        assert!(prompter.asked()[0].contains("[1]\t kitchen-esp"));
    }

    #[test]
    fn test_non_interactive_takes_first() {
        let discovery = StaticDiscovery::new(hosts(), None);
        assert_eq!(discovery.discover(None).unwrap().name, "kitchen-esp");
    }

    #[test]
    fn test_no_match() {
        let discovery = StaticDiscovery::new(hosts(), None);
        assert!(matches!(
            discovery.discover(Some("attic")),
            Err(DiscoveryError::NoMatch(Some(_)))
        ));
    }
}
