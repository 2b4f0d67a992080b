//! Pure connection state management for the MQTT client
//!
//! Connection state, reconnect policy, and option construction live here as
//! pure functions so they are testable without a broker.

use crate::config::MqttSection;
use crate::transport::TransportError;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state, first connect in progress
    Connecting,
    /// Connected and ready for operations
    Connected,
    /// Disconnected with reason; the supervisor keeps retrying
    Disconnected(String),
}

/// Fixed-delay reconnect policy.
///
/// Devices tolerate command gaps, so reconnection trades speed for broker
/// friendliness: one fixed delay, unlimited attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub delay: Duration,
}

impl ReconnectConfig {
    pub fn from_section(section: &MqttSection) -> Self {
        Self {
            delay: Duration::from_millis(section.reconnect_delay_ms),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(5000),
        }
    }
}

/// Build MQTT options from the config section.
///
/// The client id gets a millisecond suffix so a restarting process never
/// collides with its own half-closed session on the broker.
pub fn configure_mqtt_options(section: &MqttSection) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&section.broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(section.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(section.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let client_id = format!("homegrowd-{timestamp}");
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &section.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = section
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(&username, &password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_section() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            topic_prefix: "homegrow/devices".to_string(),
            username_env: None,
            password_env: None,
            reconnect_delay_ms: 5000,
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_section());
        assert!(options.is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut section = test_section();
        section.broker_url = "not a url".to_string();
        let result = configure_mqtt_options(&section);
        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_default_port_by_scheme() {
        // mqtt:// without an explicit port should not fail
        let mut section = test_section();
        section.broker_url = "mqtt://broker.local".to_string();
        assert!(configure_mqtt_options(&section).is_ok());

        section.broker_url = "mqtts://broker.local".to_string();
        assert!(configure_mqtt_options(&section).is_ok());
    }

    #[test]
    fn test_reconnect_config_from_section() {
        let mut section = test_section();
        section.reconnect_delay_ms = 250;
        let config = ReconnectConfig::from_section(&section);
        assert_eq!(config.delay, Duration::from_millis(250));
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("lost".to_string())
        );
    }
}
