use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::push::fallback::DEFAULT_PREVIEW_MAX_CHARS;
use crate::state::KeepAlive;

const DEFAULT_CONFIG_PATH: &str = "./relay.toml";

/// Presence and call-signaling relay
///
/// Only flags actually given on the command line (or through their env
/// var) are serialized, so unset flags never mask the TOML file.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "relay-server", version, about = "Presence and call-signaling relay")]
pub struct Cli {
    /// Port to listen on [default: 5000]
    #[arg(long, env = "RELAY_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "RELAY_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./relay.toml]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub generate_config: bool,

    /// Data directory for the SQLite store [default: ./data]
    #[arg(long, env = "RELAY_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Effective configuration after every layer is merged.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,

    /// Push fallback configuration ([push] section in TOML)
    #[serde(default)]
    pub push: Option<PushConfig>,

    /// WebSocket keepalive configuration ([ws] section in TOML)
    #[serde(default)]
    pub ws: Option<WsConfig>,
}

/// Configuration for out-of-band push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Whether notifications are sent to the gateway (default: false, log only)
    #[serde(default)]
    pub enabled: bool,

    /// HTTP endpoint accepting JSON push requests
    #[serde(default)]
    pub gateway_url: String,

    /// Text previews longer than this are truncated (default: 50)
    #[serde(default = "default_preview_max_chars")]
    pub preview_max_chars: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gateway_url: String::new(),
            preview_max_chars: DEFAULT_PREVIEW_MAX_CHARS,
        }
    }
}

fn default_preview_max_chars() -> usize {
    DEFAULT_PREVIEW_MAX_CHARS
}

/// WebSocket ping/pong timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

impl From<&WsConfig> for KeepAlive {
    fn from(ws: &WsConfig) -> Self {
        Self {
            ping_interval: Duration::from_secs(ws.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(ws.pong_timeout_secs.max(1)),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            config: DEFAULT_CONFIG_PATH.to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            push: None,
            ws: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Cli::parse();
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::layered(Toml::file(config_path), cli)
    }

    /// Merge every layer over the built-in defaults; `file` is the TOML layer.
    pub fn layered(file: impl Provider, cli: Cli) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    pub fn push_config(&self) -> PushConfig {
        self.push.clone().unwrap_or_default()
    }

    pub fn keepalive(&self) -> KeepAlive {
        self.ws.as_ref().map(KeepAlive::from).unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite store (users, friends, participants, calls)
# data_dir = "./data"

# ---- Push Fallback ----
# [push]
# enabled = false
# gateway_url = "http://127.0.0.1:8080/push"
# preview_max_chars = 50   # longer text previews are cut and end in "..."

# ---- WebSocket Keepalive ----
# [ws]
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
