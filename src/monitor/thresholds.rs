pub const DEFAULT_COMPACT_THRESHOLD: u64 = 170_000;
pub const WARNING_RATIO: f64 = 0.85;

/// Signals that the estimated token count is close enough to the compaction
/// threshold that a handoff should be written. Stateless: rate limiting is
/// the caller's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreCompactDetector {
    threshold: u64,
}

impl Default for PreCompactDetector {
    fn default() -> Self {
        Self::new(DEFAULT_COMPACT_THRESHOLD)
    }
}

impl PreCompactDetector {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_create_handoff(&self, current_tokens: u64) -> bool {
        current_tokens as f64 >= self.threshold as f64 * WARNING_RATIO
    }

    /// Tokens left before the threshold, floored at zero.
    pub fn time_until_compact(&self, current_tokens: u64) -> u64 {
        self.threshold.saturating_sub(current_tokens)
    }

    pub fn usage_ratio(&self, current_tokens: u64) -> f64 {
        if self.threshold == 0 {
            return 1.0;
        }
        current_tokens as f64 / self.threshold as f64
    }
}
