use std::ops::RangeInclusive;
use std::time::Duration;

/// Scheduling constants shared by both roles. The window margin and the
/// backoff bounds are field-calibrated values, not derived ones.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    /// Receive timeout per loop iteration; bounds how stale a keypress or
    /// an expired test window can get.
    pub poll_interval: Duration,
    /// Added to `num_packets * delay_ms` to cover relay stagger and
    /// store/transmit jitter.
    pub test_window_margin: Duration,
    /// Random wait before a relay answers an info request.
    pub info_backoff_ms: RangeInclusive<u64>,
    pub prompt_timeout: Duration,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            test_window_margin: Duration::from_secs(2),
            info_backoff_ms: 50..=200,
            prompt_timeout: Duration::from_secs(30),
        }
    }
}
