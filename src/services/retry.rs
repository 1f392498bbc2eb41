use std::str::FromStr;
use std::time::Duration;

/// Attempt budget for completion calls. One attempt means no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(4_000),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl RetryConfig {
    /// Reads `AI_MAX_ATTEMPTS`, `AI_RETRY_BASE_DELAY_MS` and `AI_RETRY_MAX_DELAY_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration, cap: u64| {
            parsed::<u64>(&lookup, key)
                .map(|ms| Duration::from_millis(ms.min(cap)))
                .unwrap_or(fallback)
        };

        Self {
            max_attempts: parsed::<usize>(&lookup, "AI_MAX_ATTEMPTS")
                .map(|n| n.clamp(1, 20))
                .unwrap_or(defaults.max_attempts),
            base_delay: millis("AI_RETRY_BASE_DELAY_MS", defaults.base_delay, 60_000),
            max_delay: millis("AI_RETRY_MAX_DELAY_MS", defaults.max_delay, 300_000),
        }
    }

    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Delay after failed attempt `attempt` (1-based): base, 2x base, 4x base... capped.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let doublings = attempt.saturating_sub(1).min(30) as u32;
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_is_single_attempt() {
        let retry = RetryConfig::from_lookup(lookup(&[]));
        assert_eq!(retry, RetryConfig::default());
        assert!(!retry.retries_enabled());
    }

    #[test]
    fn test_env_overrides_are_clamped() {
        let retry = RetryConfig::from_lookup(lookup(&[
            ("AI_MAX_ATTEMPTS", " 99 "),
            ("AI_RETRY_BASE_DELAY_MS", "10"),
            ("AI_RETRY_MAX_DELAY_MS", "nope"),
        ]));
        assert_eq!(retry.max_attempts, 20);
        assert_eq!(retry.base_delay, Duration::from_millis(10));
        assert_eq!(retry.max_delay, Duration::from_millis(4_000));

        let retry = RetryConfig::from_lookup(lookup(&[("AI_MAX_ATTEMPTS", "0")]));
        assert_eq!(retry.max_attempts, 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(350));
        assert_eq!(retry.backoff(40), Duration::from_millis(350));
    }
}
