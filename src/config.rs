//! Engine configuration loaded from TOML
//!
//! All tunables for the automation engine live here: broker connection,
//! poll intervals, cooldown limits, and dispatcher timeouts. Credentials are
//! referenced by environment variable name, never stored in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub rules: RulesSection,
    #[serde(default)]
    pub programs: ProgramsSection,
    #[serde(default)]
    pub cooldown: CooldownSection,
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    #[serde(default)]
    pub sensors: SensorsSection,
}

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with protocol and port (mqtt:// or mqtts://)
    pub broker_url: String,
    /// Topic prefix all device topics live under
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Environment variable containing the username
    pub username_env: Option<String>,
    /// Environment variable containing the password
    pub password_env: Option<String>,
    /// Fixed reconnect delay in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_topic_prefix() -> String {
    "homegrow/devices".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

/// Rule engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulesSection {
    /// Poll interval for rule evaluation in seconds
    #[serde(default = "default_rule_poll_secs")]
    pub poll_interval_secs: u64,
    /// Fixed pause between actions of a triggered rule in milliseconds
    #[serde(default = "default_action_pause_ms")]
    pub action_pause_ms: u64,
}

fn default_rule_poll_secs() -> u64 {
    30
}

fn default_action_pause_ms() -> u64 {
    1000
}

impl Default for RulesSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_rule_poll_secs(),
            action_pause_ms: default_action_pause_ms(),
        }
    }
}

/// Program scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramsSection {
    /// Poll interval for schedule resolution in seconds
    #[serde(default = "default_program_poll_secs")]
    pub poll_interval_secs: u64,
}

fn default_program_poll_secs() -> u64 {
    60
}

impl Default for ProgramsSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_program_poll_secs(),
        }
    }
}

/// Cooldown / rate-limit settings shared by rules and programs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooldownSection {
    /// Rate-limit window in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Maximum executions per id inside the rate-limit window
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,
}

fn default_rate_window_secs() -> u64 {
    300
}

fn default_max_per_window() -> usize {
    5
}

impl Default for CooldownSection {
    fn default() -> Self {
        Self {
            rate_window_secs: default_rate_window_secs(),
            max_per_window: default_max_per_window(),
        }
    }
}

/// Command dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatcherSection {
    /// Default acknowledgment timeout per command in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Default maximum retries per command
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Interval of the timeout sweep in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Lookback window for acknowledgment correlation in seconds
    #[serde(default = "default_ack_lookback_secs")]
    pub ack_lookback_secs: u64,
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_ack_lookback_secs() -> u64 {
    120
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
            max_retries: default_max_retries(),
            sweep_interval_secs: default_sweep_interval_secs(),
            ack_lookback_secs: default_ack_lookback_secs(),
        }
    }
}

/// Telemetry freshness settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorsSection {
    /// Readings older than this count as missing during condition evaluation
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_age_secs() -> u64 {
    300
}

impl Default for SensorsSection {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_url.is_empty() {
            return Err(ConfigError::Invalid("mqtt.broker_url is required".into()));
        }
        if self.mqtt.topic_prefix.is_empty() || self.mqtt.topic_prefix.contains('+') {
            return Err(ConfigError::Invalid(
                "mqtt.topic_prefix must be a non-empty literal topic path".into(),
            ));
        }
        if self.rules.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rules.poll_interval_secs must be > 0".into(),
            ));
        }
        if self.programs.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "programs.poll_interval_secs must be > 0".into(),
            ));
        }
        if self.cooldown.max_per_window == 0 {
            return Err(ConfigError::Invalid(
                "cooldown.max_per_window must be > 0".into(),
            ));
        }
        if self.dispatcher.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.command_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve MQTT credentials from the configured environment variables
    pub fn mqtt_credentials(&self) -> Option<(String, String)> {
        let username_env = self.mqtt.username_env.as_ref()?;
        let username = std::env::var(username_env).ok()?;
        let password = self
            .mqtt
            .password_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .unwrap_or_default();
        Some((username, password))
    }
}
