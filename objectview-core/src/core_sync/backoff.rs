//! Randomized delay windows for rebind coalescing and reconnect backoff

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A delay drawn uniformly from `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterWindow {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl JitterWindow {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Draw a delay. A degenerate window always yields `min`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let spread = (self.max - self.min).as_millis() as u64;
        self.min + Duration::from_millis(rand::rng().random_range(0..spread.max(1)))
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

impl Default for JitterWindow {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(1500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_in_window() {
        let window = JitterWindow::default();
        for _ in 0..200 {
            let delay = window.sample();
            assert!(delay >= Duration::from_millis(500));
            assert!(delay < Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_degenerate_window() {
        let window = JitterWindow::new(Duration::from_millis(10), Duration::from_millis(10));
        assert_eq!(window.sample(), Duration::from_millis(10));

        let inverted = JitterWindow::new(Duration::from_millis(10), Duration::from_millis(5));
        assert!(!inverted.is_valid());
        assert_eq!(inverted.sample(), Duration::from_millis(10));
    }
}
