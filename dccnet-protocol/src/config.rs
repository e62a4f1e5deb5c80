//! Protocol policy constants
//!
//! The sync marker, payload ceiling, retransmission interval, and retry
//! ceiling are fixed per connection and never negotiated. They are injected at
//! construction so tests can shrink the timers.

use std::time::Duration;
use thiserror::Error;

/// Default 4-byte sync pattern; it appears twice at the start of every frame.
pub const DEFAULT_SYNC: [u8; 4] = [0xDC, 0xC0, 0x23, 0xC2];

/// Default maximum payload bytes per frame
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 4096;

/// Default time to wait for an ACK before resending
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of resends before giving up on a frame
pub const DEFAULT_MAX_RETRIES: u32 = 16;

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Max payload size must be between 1 and {max}, got {size}")]
    PayloadSize { size: usize, max: usize },

    #[error("Retransmit interval must be non-zero")]
    ZeroInterval,
}

/// Per-connection protocol configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// 4-byte sync pattern (sent twice per frame)
    pub sync_marker: [u8; 4],
    /// Largest payload a frame may declare
    pub max_payload_size: usize,
    /// Time to wait for an ACK before resending
    pub retransmit_interval: Duration,
    /// Resends allowed before the connection is reset
    pub max_retries: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            sync_marker: DEFAULT_SYNC,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ProtocolConfig {
    /// Set the retransmit interval
    pub fn with_retransmit_interval(mut self, interval: Duration) -> Self {
        self.retransmit_interval = interval;
        self
    }

    /// Set the retry ceiling
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the payload ceiling
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the sync pattern
    pub fn with_sync_marker(mut self, marker: [u8; 4]) -> Self {
        self.sync_marker = marker;
        self
    }

    /// The full 8-byte marker as it appears on the wire
    pub fn sync_pattern(&self) -> [u8; 8] {
        let mut pattern = [0u8; 8];
        pattern[..4].copy_from_slice(&self.sync_marker);
        pattern[4..].copy_from_slice(&self.sync_marker);
        pattern
    }

    /// Reject values the wire format cannot carry
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = u16::MAX as usize;
        if self.max_payload_size == 0 || self.max_payload_size > max {
            return Err(ConfigError::PayloadSize {
                size: self.max_payload_size,
                max,
            });
        }
        if self.retransmit_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}
