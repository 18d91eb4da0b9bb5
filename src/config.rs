//! Agent configuration: device sources, network options, and timers.
//!
//! A YAML document loaded at startup (`--config`, or `NOTCH_CONFIG`). The
//! SSH algorithm tables that used to live here moved to
//! [`crate::transport::algorithms`], which is where the transport that
//! actually negotiates them lives; this module now holds only the
//! agent-level knobs the original `notch-agent` read out of its config file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::InfraError;

fn default_port() -> u16 {
    9999
}

fn default_credentials_path() -> String {
    "/etc/notch/credentials.yaml".to_string()
}

fn default_session_maint_period() -> u64 {
    10
}

fn default_max_active_sessions() -> usize {
    256
}

fn default_max_idle_secs() -> u64 {
    900
}

/// One router.db-style root directory to scan, or a DNS-TXT zone to query
/// on demand. Mirrors the `device_sources` list the agent's YAML config
/// carries; `kind` selects which [`crate::registry::Provider`] is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceSource {
    RouterDb {
        path: String,
        #[serde(default)]
        ignore_down_devices: bool,
    },
    DnsTxt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timers {
    #[serde(default = "default_session_maint_period")]
    pub session_maint_period: u64,
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
}

impl Default for Timers {
    fn default() -> Self {
        Timers {
            session_maint_period: default_session_maint_period(),
            max_idle_secs: default_max_idle_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    #[serde(default = "default_max_active_sessions")]
    pub max_active_sessions: usize,
    #[serde(default)]
    pub timers: Timers,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            port: default_port(),
            credentials_path: default_credentials_path(),
            max_active_sessions: default_max_active_sessions(),
            timers: Timers::default(),
        }
    }
}

/// Top-level agent configuration: at minimum a list of device sources to
/// scan, plus the agent's own network and timing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub device_sources: Vec<DeviceSource>,
    #[serde(default)]
    pub options: Options,
}

impl AgentConfig {
    pub fn load_file(path: impl AsRef<Path>) -> Result<AgentConfig, InfraError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| InfraError::Config(format!("reading {:?}: {e}", path.as_ref())))?;
        Self::load_str(&text)
    }

    pub fn load_str(text: &str) -> Result<AgentConfig, InfraError> {
        serde_yaml::from_str(text).map_err(|e| InfraError::Config(format!("parsing yaml: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let cfg = AgentConfig::load_str(
            "device_sources:\n  - kind: router_db\n    path: /etc/notch/router.db\n",
        )
        .unwrap();
        assert_eq!(cfg.options.port, 9999);
        assert_eq!(cfg.options.timers.session_maint_period, 10);
    }

    #[test]
    fn dns_txt_source_needs_no_fields() {
        let cfg = AgentConfig::load_str("device_sources:\n  - kind: dns_txt\n").unwrap();
        assert!(matches!(cfg.device_sources[0], DeviceSource::DnsTxt));
    }

    #[test]
    fn bad_yaml_is_a_config_error() {
        let err = AgentConfig::load_str("not: [valid").unwrap_err();
        assert!(matches!(err, InfraError::Config(_)));
    }
}
