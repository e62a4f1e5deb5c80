//! Configuration file support for DCCNET CLI tools
//!
//! ```toml
//! [protocol]
//! sync_marker = "dcc023c2"
//! max_payload_size = 4096
//! retransmit_interval_ms = 1000
//! max_retries = 16
//! ```
//!
//! Every key is optional; missing keys keep the protocol defaults.

use dccnet_protocol::ProtocolConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Overrides for [`ProtocolConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSection {
    /// 4-byte sync marker as 8 hex digits
    pub sync_marker: Option<String>,
    /// Largest payload per frame
    pub max_payload_size: Option<usize>,
    /// ACK timeout in milliseconds
    pub retransmit_interval_ms: Option<u64>,
    /// Resends before the connection is reset
    pub max_retries: Option<u32>,
}

/// Combined configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolSection,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// A configuration spelling out every default
    pub fn example() -> Self {
        let defaults = ProtocolConfig::default();
        Config {
            protocol: ProtocolSection {
                sync_marker: Some(hex::encode(defaults.sync_marker)),
                max_payload_size: Some(defaults.max_payload_size),
                retransmit_interval_ms: Some(defaults.retransmit_interval.as_millis() as u64),
                max_retries: Some(defaults.max_retries),
            },
        }
    }

    /// Apply the overrides on top of the defaults and validate the result
    pub fn protocol_config(&self) -> Result<ProtocolConfig, ConfigError> {
        let section = &self.protocol;
        let mut config = ProtocolConfig::default();

        if let Some(marker) = &section.sync_marker {
            config.sync_marker = parse_marker(marker)?;
        }
        if let Some(size) = section.max_payload_size {
            config.max_payload_size = size;
        }
        if let Some(ms) = section.retransmit_interval_ms {
            config.retransmit_interval = Duration::from_millis(ms);
        }
        if let Some(retries) = section.max_retries {
            config.max_retries = retries;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_marker(text: &str) -> Result<[u8; 4], ConfigError> {
    let bytes = hex::decode(text.trim())
        .map_err(|e| ConfigError::Invalid(format!("sync_marker {:?}: {}", text, e)))?;
    <[u8; 4]>::try_from(bytes.as_slice()).map_err(|_| {
        ConfigError::Invalid(format!(
            "sync_marker must be 4 bytes, got {}",
            bytes.len()
        ))
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid protocol parameters: {0}")]
    Protocol(#[from] dccnet_protocol::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.protocol_config().unwrap(), ProtocolConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse(
            r#"
            [protocol]
            sync_marker = "01020304"
            retransmit_interval_ms = 250
            max_retries = 3
            "#,
        )
        .unwrap();
        let protocol = config.protocol_config().unwrap();

        assert_eq!(protocol.sync_marker, [1, 2, 3, 4]);
        assert_eq!(protocol.retransmit_interval, Duration::from_millis(250));
        assert_eq!(protocol.max_retries, 3);
        assert_eq!(protocol.max_payload_size, 4096);
    }

    #[test]
    fn test_example_round_trips() {
        let config = Config::example();
        let text = toml::to_string(&config).unwrap();
        let parsed = Config::parse(&text).unwrap();

        assert_eq!(parsed, config);
        assert_eq!(
            parsed.protocol_config().unwrap().sync_marker,
            [0xDC, 0xC0, 0x23, 0xC2]
        );
    }

    #[test]
    fn test_bad_marker_rejected() {
        let config = Config::parse("[protocol]\nsync_marker = \"dcc0\"\n").unwrap();
        assert!(matches!(
            config.protocol_config(),
            Err(ConfigError::Invalid(_))
        ));

        let config = Config::parse("[protocol]\nsync_marker = \"zzzzzzzz\"\n").unwrap();
        assert!(matches!(
            config.protocol_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = Config::parse("[protocol]\nretransmit_interval_ms = 0\n").unwrap();
        assert!(matches!(
            config.protocol_config(),
            Err(ConfigError::Protocol(_))
        ));

        assert!(Config::parse("[protocol]\nwindow = 8\n").is_err());
    }
}
