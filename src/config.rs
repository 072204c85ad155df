use std::time::Duration;

pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 50;
pub const DEFAULT_CACHE_MAX_AGE_DAYS: u64 = 7;

/// Tunables for the cache and the background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub cache_max_entries: usize,
    pub cache_max_age: Duration,
    /// Run the idle precompute sweep after each filter request.
    pub precompute: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_DAYS * 24 * 60 * 60),
            precompute: true,
        }
    }
}

impl EngineConfig {
    pub fn max_age_ms(&self) -> i64 {
        i64::try_from(self.cache_max_age.as_millis()).unwrap_or(i64::MAX)
    }
}
