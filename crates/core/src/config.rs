//! # Orchestrator Configuration
//!
//! Plain serde structs with defaults. The library takes configuration as
//! values; there is no CLI or file-loading layer here.

use serde::{Deserialize, Serialize};

use crate::models::Verbosity;

/// Retry policy for transient capability failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (1 disables retries)
    pub max_attempts: u32,
    /// Backoff for attempt n is `base_delay_ms * 2^(n-1)`, capped
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry (1-based attempt that just failed)
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        std::time::Duration::from_millis(ms)
    }
}

/// Pattern bank tuning (bounded LRU with TTL)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Maximum retained patterns; oldest `last_used` evicted beyond this
    pub capacity: usize,
    /// Entries unused for longer than this are skipped and purged
    pub ttl_secs: i64,
    /// Cached strategies below this outcome quality are not reused
    pub min_quality: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: 7 * 24 * 3_600,
            min_quality: 0.5,
        }
    }
}

/// Configuration for the query coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Budget for the Architecture stage (agent dispatch, whole strategy)
    pub strategy_timeout_ms: u64,
    /// Budget for each of the other pipeline stages
    pub stage_timeout_ms: u64,
    /// Bound of the event channel; progress events are shed when it is full
    pub event_buffer: usize,
    /// Waiting admissions per agent type beyond which low-priority tasks shed
    pub queue_depth_threshold: usize,
    /// Items with a composite trust below this are discarded in Refinement
    pub min_trust: f64,
    /// Diversity cap: max items sharing one genre in the final set
    pub max_per_genre: usize,
    /// Diversity cap: max items sharing one platform in the final set
    pub max_per_platform: usize,
    /// How many top items get a natural-language explanation
    pub explain_top_n: usize,
    pub verbosity: Verbosity,
    pub retry: RetryConfig,
    pub patterns: PatternConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: 8_000,
            stage_timeout_ms: 2_000,
            event_buffer: 64,
            queue_depth_threshold: 8,
            min_trust: 0.3,
            max_per_genre: 3,
            max_per_platform: 4,
            explain_top_n: 3,
            verbosity: Verbosity::Standard,
            retry: RetryConfig::default(),
            patterns: PatternConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.patterns.capacity, 256);
        assert!(config.min_trust > 0.0 && config.min_trust < 1.0);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1).as_millis(), 100);
        assert_eq!(retry.delay_for(2).as_millis(), 200);
        assert_eq!(retry.delay_for(3).as_millis(), 400);
        // Far attempts hit the cap
        assert_eq!(retry.delay_for(10).as_millis(), 2_000);
    }
}
