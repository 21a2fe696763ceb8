//! Configuration types for stompkit clients.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::validate::{validate_destination, validate_url};
use crate::Error;

/// Client configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker settings
    pub broker: BrokerSettings,
    /// Session settings
    pub session: SessionSettings,
    /// Destination naming settings
    pub destinations: DestinationSettings,
    /// Destinations subscribed on every connect with the default handler
    pub auto_subscriptions: Vec<String>,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ClientConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        validate_url(&self.broker.url)
            .map_err(|e| Error::Config(format!("broker.url: {e}")))?;

        if self.broker.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "broker.connect_timeout_ms must be > 0".to_string(),
            ));
        }

        for destination in &self.auto_subscriptions {
            validate_destination(destination)
                .map_err(|e| Error::Config(format!("auto_subscriptions: {e}")))?;
        }

        self.destinations.validate()?;

        Ok(())
    }
}

/// Broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Broker endpoint URL
    pub url: String,
    /// How long to wait for a session handshake, in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Resubscribe carried-over destinations with the handler they were bound
    /// to, instead of the default logging handler
    pub restore_handlers: bool,
}

/// Destination naming settings.
///
/// Brokers route `application_prefixes` destinations to application handlers,
/// `topic_prefix` destinations to the broker, and `user_prefix` destinations to
/// per-user queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationSettings {
    /// Prefixes of destinations handled by the application
    pub application_prefixes: Vec<String>,
    /// Prefix of per-user destinations
    pub user_prefix: String,
    /// Prefix of broker topics
    pub topic_prefix: String,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            application_prefixes: vec!["/app".to_string()],
            user_prefix: "/user".to_string(),
            topic_prefix: "/topic".to_string(),
        }
    }
}

impl DestinationSettings {
    /// One application destination per configured prefix.
    pub fn application_endpoints(&self, suffix: &str) -> Vec<String> {
        self.application_prefixes
            .iter()
            .map(|prefix| compose(prefix, suffix))
            .collect()
    }

    /// The per-user destination for `suffix`.
    pub fn user_endpoint(&self, suffix: &str) -> String {
        compose(&self.user_prefix, suffix)
    }

    /// The broker topic for `suffix`.
    pub fn topic_endpoint(&self, suffix: &str) -> String {
        compose(&self.topic_prefix, suffix)
    }

    fn validate(&self) -> crate::Result<()> {
        let prefixes = self
            .application_prefixes
            .iter()
            .chain([&self.user_prefix, &self.topic_prefix]);
        for prefix in prefixes {
            if !prefix.starts_with('/') {
                return Err(Error::Config(format!(
                    "destination prefix '{prefix}' must start with '/'"
                )));
            }
        }
        Ok(())
    }
}

fn compose(prefix: &str, suffix: &str) -> String {
    format!("{}{}", prefix, suffix)
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
