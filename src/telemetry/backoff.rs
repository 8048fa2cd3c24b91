//! 重连退避策略
//!
//! 线性退避：第 n 次重连前等待 `base_delay * n`，次数超过上限后
//! 不再重试，链路进入终止态。策略与传输机制解耦，便于单测。

use std::time::Duration;

/// 线性退避策略
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// 第 `attempts` 次重连前应等待的时间；超过上限返回 None
    pub fn delay_for(&self, attempts: u32) -> Option<Duration> {
        if attempts == 0 || attempts > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempts)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_schedule() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 3);
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_backoff_stops_after_max_attempts() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 3);
        assert_eq!(policy.delay_for(4), None);
        assert_eq!(policy.delay_for(100), None);
    }

    #[test]
    fn test_zero_attempts_has_no_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), None);
    }
}
