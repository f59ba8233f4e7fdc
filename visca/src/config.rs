//! Engine configuration

use std::time::Duration;

use visca_core::{
    Address, DEFAULT_CONNECTION,
    constants::{DEFAULT_ACK_TIMEOUT_MS, DEFAULT_COMPLETION_TIMEOUT, MAX_RETRIES},
};
use visca_transport::{LinkOptions, NetMode};
use visca_types::Speeds;

use crate::{
    backoff::BackoffConfig,
    error::{Error, Result},
};

/// Configuration for a VISCA engine.
///
/// Read once when the engine starts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use visca::Config;
///
/// let config = Config::new("/dev/ttyUSB0")
///     .with_auto_connect(false)
///     .with_ack_timeout(Duration::from_millis(300));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Serial device path or `host:port`
    pub connection: String,
    /// Protocol for `host:port` strings without a scheme
    pub net_mode: NetMode,
    pub link: LinkOptions,
    /// Cameras on the chain; the first one answers connection probes
    pub cameras: Vec<Address>,
    /// Initial operator speeds for every camera
    pub speeds: Speeds,
    /// Connect as soon as the engine starts
    pub auto_connect: bool,
    /// Time to wait for an Ack or inquiry reply before resending
    pub ack_timeout: Duration,
    /// Time an acknowledged command has to complete
    pub completion_timeout: Duration,
    /// Resends after the first transmission
    pub max_retries: u32,
    pub heartbeat_interval: Duration,
    /// Consecutive I/O failures that end a connection
    pub io_failure_threshold: u32,
    pub backoff: BackoffConfig,
    /// Connected time after which the backoff starts over
    pub stability_window: Duration,
    /// Give up after this many failed attempts in a row (`None` retries forever)
    pub max_reconnect_attempts: Option<u32>,
    /// Requests waiting per camera
    pub queue_depth: usize,
    /// Record command effects before the camera confirms them
    pub optimistic_state: bool,
    /// New directional actions replace older ones of the same kind
    pub supersede_motion: bool,
    /// Engine tick
    pub poll_interval: Duration,
    pub event_capacity: usize,
    /// Requests buffered between clients and the engine
    pub request_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: DEFAULT_CONNECTION.to_string(),
            net_mode: NetMode::default(),
            link: LinkOptions::default(),
            cameras: vec![Address::DEFAULT],
            speeds: Speeds::default(),
            auto_connect: true,
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            completion_timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT),
            max_retries: MAX_RETRIES,
            heartbeat_interval: Duration::from_secs(5),
            io_failure_threshold: 3,
            backoff: BackoffConfig::default(),
            stability_window: Duration::from_secs(10),
            max_reconnect_attempts: None,
            queue_depth: 8,
            optimistic_state: true,
            supersede_motion: true,
            poll_interval: Duration::from_millis(10),
            event_capacity: 256,
            request_capacity: 64,
        }
    }
}

impl Config {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            ..Self::default()
        }
    }

    pub fn with_net_mode(mut self, mode: NetMode) -> Self {
        self.net_mode = mode;
        self
    }

    pub fn with_link_options(mut self, link: LinkOptions) -> Self {
        self.link = link;
        self
    }

    pub fn with_cameras(mut self, cameras: impl IntoIterator<Item = Address>) -> Self {
        self.cameras = cameras.into_iter().collect();
        self
    }

    pub fn with_speeds(mut self, speeds: Speeds) -> Self {
        self.speeds = speeds;
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_io_failure_threshold(mut self, threshold: u32) -> Self {
        self.io_failure_threshold = threshold;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_stability_window(mut self, window: Duration) -> Self {
        self.stability_window = window;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_optimistic_state(mut self, enabled: bool) -> Self {
        self.optimistic_state = enabled;
        self
    }

    pub fn with_supersede_motion(mut self, enabled: bool) -> Self {
        self.supersede_motion = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Camera that answers connection probes
    pub fn probe_address(&self) -> Address {
        self.cameras.first().copied().unwrap_or_default()
    }

    /// Check the values are usable
    ///
    /// # Errors
    ///
    /// Returns `Types(Validation)` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: &str| -> Result<()> { Err(Error::Types(visca_types::Error::Validation(msg.into()))) };

        if self.cameras.is_empty() {
            return invalid("at least one camera address is required");
        }
        if self.cameras.iter().any(|a| a.is_broadcast()) {
            return invalid("the broadcast address cannot be a camera");
        }
        self.speeds.validate()?;
        if self.queue_depth == 0 {
            return invalid("queue_depth must be at least 1");
        }
        if self.io_failure_threshold == 0 {
            return invalid("io_failure_threshold must be at least 1");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be positive");
        }
        if self.ack_timeout.is_zero() || self.completion_timeout.is_zero() {
            return invalid("timeouts must be positive");
        }
        if self.backoff.floor.is_zero() || self.backoff.factor == 0 {
            return invalid("backoff floor and factor must be positive");
        }
        if self.event_capacity == 0 || self.request_capacity == 0 {
            return invalid("channel capacities must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.connection, "192.168.1.32:8234");
        assert_eq!(config.net_mode, NetMode::Rfc2217);
        assert_eq!(config.cameras, vec![Address::DEFAULT]);
        assert_eq!(config.speeds, Speeds::default());
        assert_eq!(config.ack_timeout, Duration::from_millis(500));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.queue_depth, 8);
        assert_eq!(config.max_reconnect_attempts, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let cam2 = Address::new(2).unwrap();
        let config = Config::new("COM3")
            .with_cameras([cam2, Address::DEFAULT])
            .with_queue_depth(2)
            .with_max_reconnect_attempts(Some(5));
        assert_eq!(config.connection, "COM3");
        assert_eq!(config.probe_address(), cam2);
        assert_eq!(config.queue_depth, 2);
        assert_eq!(config.max_reconnect_attempts, Some(5));
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().with_cameras(Vec::new()).validate().is_err());
        assert!(Config::default().with_cameras([Address::BROADCAST]).validate().is_err());
        assert!(Config::default().with_queue_depth(0).validate().is_err());
        assert!(Config::default()
            .with_speeds(Speeds { pan: 30, ..Speeds::default() })
            .validate()
            .is_err());
    }
}
