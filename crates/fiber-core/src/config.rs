use std::env;
use std::time::Duration;

/// Environment variable overriding [`SchedulerConfig::yield_threshold`], in microseconds.
pub const YIELD_THRESHOLD_ENV: &str = "FIBER_YIELD_THRESHOLD_US";

/// Tunables for the unit-of-work loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// The loop keeps processing fibers while the deadline reports more than
    /// this much time remaining.
    pub yield_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            yield_threshold: Duration::from_millis(1),
        }
    }
}

impl SchedulerConfig {
    pub fn with_yield_threshold(mut self, threshold: Duration) -> Self {
        self.yield_threshold = threshold;
        self
    }

    /// Defaults, overridden by `FIBER_YIELD_THRESHOLD_US` when it parses.
    pub fn from_env() -> Self {
        let config = Self::default();
        match env::var(YIELD_THRESHOLD_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(micros) => config.with_yield_threshold(Duration::from_micros(micros)),
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring unparsable {YIELD_THRESHOLD_ENV}");
                    config
                }
            },
            Err(_) => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_one_millisecond() {
        assert_eq!(
            SchedulerConfig::default().yield_threshold,
            Duration::from_millis(1)
        );
    }

    #[test]
    fn builder_overrides_threshold() {
        let config = SchedulerConfig::default().with_yield_threshold(Duration::ZERO);
        assert_eq!(config.yield_threshold, Duration::ZERO);
    }
}
