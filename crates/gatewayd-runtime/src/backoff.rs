//! Exponential backoff with jitter for the backend restart policy
//! (spec §4.2 "Restart policy": "bounded back-off (exponential, capped, jittered)").

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            jitter: true,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff for the given zero-based consecutive-failure count.
    pub fn duration_for(&self, attempt: u32) -> Duration {
        let base = self.initial.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max.as_millis() as f64);

        if self.jitter {
            let jitter = rand::random::<f64>() * capped * 0.1;
            Duration::from_millis((capped + jitter) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_growth_without_jitter() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(policy.duration_for(0).as_millis(), 100);
        assert_eq!(policy.duration_for(1).as_millis(), 200);
        assert_eq!(policy.duration_for(2).as_millis(), 400);
    }

    #[test]
    fn caps_at_max() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(false);
        assert!(policy.duration_for(20) <= Duration::from_secs(1));
    }

    #[test]
    fn jitter_only_adds_never_subtracts() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(5))
            .with_jitter(true);
        for attempt in 0..4 {
            assert!(policy.duration_for(attempt) >= Duration::from_millis(100));
        }
    }
}
