//! Batch URL prober configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Limits applied when probing candidate URLs of a batch pattern.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProberConfig {
    /// Maximum number of existence checks in flight per probe call.
    #[validate(range(min = 1, max = 64))]
    pub concurrency: usize,

    /// Consecutive misses that end an open-ended (wildcard) probe.
    #[validate(range(min = 1, max = 100))]
    pub miss_streak_limit: u32,

    /// Highest index an open-ended probe will ever try.
    #[validate(range(min = 1, max = 999_999))]
    pub index_ceiling: u64,

    /// Retry a wildcard probe from index 0 when starting at 1 finds nothing.
    pub zero_fallback: bool,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            miss_streak_limit: default_miss_streak_limit(),
            index_ceiling: default_index_ceiling(),
            zero_fallback: true,
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_miss_streak_limit() -> u32 {
    3
}

fn default_index_ceiling() -> u64 {
    9999
}
