use std::time::Duration;

/// Resend schedule for acknowledged commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub ack_timeout_ms: u64,
    pub max_retries: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1500,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VehicleConfig {
    pub gcs_system_id: u8,
    pub gcs_component_id: u8,
    pub retry_policy: RetryPolicy,
    /// Rate asked of the autopilot for position and HUD messages; 0 leaves its defaults alone.
    pub telemetry_rate_hz: f64,
    pub command_buffer_size: usize,
    pub connect_timeout: Duration,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            gcs_system_id: 255,
            gcs_component_id: 190,
            retry_policy: RetryPolicy::default(),
            telemetry_rate_hz: 10.0,
            command_buffer_size: 32,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl VehicleConfig {
    pub(crate) fn telemetry_interval(&self) -> Option<Duration> {
        (self.telemetry_rate_hz > 0.0).then(|| Duration::from_secs_f64(1.0 / self.telemetry_rate_hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_hertz_is_a_hundred_milliseconds() {
        let config = VehicleConfig::default();
        assert_eq!(config.telemetry_interval(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn zero_rate_requests_nothing() {
        let config = VehicleConfig {
            telemetry_rate_hz: 0.0,
            ..VehicleConfig::default()
        };
        assert_eq!(config.telemetry_interval(), None);
    }
}
