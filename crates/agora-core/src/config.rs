//! Hub configuration.

use crate::error::HubError;
use agora_protocol::codec::DEFAULT_MAX_FRAME_SIZE;
use std::time::Duration;

/// Default time a peer may stay silent before it is considered dead.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Startup parameters of the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the shared intake queue feeding the workers.
    pub intake_capacity: usize,
    /// Capacity of each connection's outbound queue. A producer that finds
    /// the queue full disconnects the connection.
    pub outbound_capacity: usize,
    /// Number of dispatcher workers.
    pub workers: usize,
    /// Interval between keepalive pings. Must be shorter than `read_timeout`.
    pub heartbeat_interval: Duration,
    /// Maximum silence on the read side before the connection is dropped.
    pub read_timeout: Duration,
    /// Deadline for a single transport write.
    pub write_timeout: Duration,
    /// Largest inbound frame accepted; larger frames close the connection.
    pub max_frame_size: usize,
    /// Most queued messages packed into one transport write.
    pub max_batch: usize,
    /// Buffer of the in-process presence event stream.
    pub presence_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 1024,
            outbound_capacity: 256,
            workers: 4,
            heartbeat_interval: DEFAULT_READ_TIMEOUT * 9 / 10,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_batch: 64,
            presence_capacity: 1024,
        }
    }
}

impl HubConfig {
    /// Check the parameters for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), HubError> {
        let positive = [
            ("intake_capacity", self.intake_capacity),
            ("outbound_capacity", self.outbound_capacity),
            ("workers", self.workers),
            ("max_frame_size", self.max_frame_size),
            ("max_batch", self.max_batch),
            ("presence_capacity", self.presence_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HubError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.heartbeat_interval.is_zero() || self.write_timeout.is_zero() {
            return Err(HubError::InvalidConfig(
                "heartbeat_interval and write_timeout must be positive".into(),
            ));
        }
        if self.heartbeat_interval >= self.read_timeout {
            return Err(HubError::InvalidConfig(format!(
                "heartbeat_interval ({:?}) must be shorter than read_timeout ({:?})",
                self.heartbeat_interval, self.read_timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_interval, Duration::from_secs(54));
        assert_eq!(config.max_frame_size, 512 * 1024);
    }

    #[test]
    fn test_heartbeat_must_beat_read_timeout() {
        let config = HubConfig {
            heartbeat_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HubError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = HubConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HubError::InvalidConfig(msg)) if msg.contains("workers")));
    }
}
