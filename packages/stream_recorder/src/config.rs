use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Layered config: defaults → optional TOML file → RECORDER_* env vars
// =============================================================================
//
//   recorder.toml:   endpoint = "wss://ws.bitstamp.net"
//                    shutdown_grace_secs = 5
//
//   env var:         RECORDER_ENDPOINT=wss://...
//                    RECORDER_SHUTDOWN_GRACE_SECS=10

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Streaming endpoint every subscription connects to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How long quitting waits for open connections to close
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl RecorderConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_endpoint() -> String {
    "wss://ws.bitstamp.net".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

/// Build the figment. A missing config file is not an error.
pub fn load_config(config_file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(RecorderConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("RECORDER_").split("__"))
}
