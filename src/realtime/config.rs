//! Realtime core configuration.

use std::time::Duration;

use super::identity::StaffId;
use super::retry::RetryPolicy;

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Delay before the first reconnect attempt
    pub initial_retry_delay: Duration,

    /// Cap on the reconnect backoff delay
    pub max_retry_delay: Duration,

    /// How long a channel may stay in the joining state before the transport
    /// reports it timed out
    pub join_timeout: Duration,

    /// Prefix for the logical channel name
    pub channel_prefix: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(30_000),
            join_timeout: Duration::from_secs(10),
            channel_prefix: "realtime".to_string(),
        }
    }
}

impl RealtimeConfig {
    /// Backoff policy derived from the configured delays
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: self.initial_retry_delay,
            max_delay: self.max_retry_delay,
        }
    }

    /// Logical channel name for one identity.
    ///
    /// Deterministic and unique per identity, so channels for different
    /// staff members can never collide.
    pub fn channel_name(&self, staff: &StaffId) -> String {
        format!("{}:staff:{}", self.channel_prefix, staff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.initial_retry_delay, Duration::from_millis(1000));
        assert_eq!(config.max_retry_delay, Duration::from_millis(30_000));
        assert_eq!(config.channel_prefix, "realtime");
    }

    #[test]
    fn test_channel_name_is_deterministic_and_scoped() {
        let config = RealtimeConfig::default();
        let a = StaffId::random();
        let b = StaffId::random();

        assert_eq!(config.channel_name(&a), config.channel_name(&a));
        assert_ne!(config.channel_name(&a), config.channel_name(&b));
        assert!(config.channel_name(&a).starts_with("realtime:staff:"));
    }

    #[test]
    fn test_retry_policy_uses_configured_delays() {
        let config = RealtimeConfig {
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(800),
            ..Default::default()
        };

        let policy = config.retry_policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(10), Duration::from_millis(800));
    }
}
