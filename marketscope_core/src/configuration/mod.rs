use std::time::Duration;

use crate::{
    DEFAULT_BATCH_SIZE, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_MAX_PAGE_SIZE,
    DEFAULT_PAGE_SIZE, DEFAULT_PATTERN_CAP, DEFAULT_SCAN_CAP, DEFAULT_SCAN_DEADLINE,
};

#[derive(Clone, Debug)]
pub struct Configuration {
    /// Rows requested per page while scanning.
    pub batch_size: usize,
    /// Total rows a single scan may visit before it stops and reports truncation.
    pub scan_cap: usize,
    pub max_page_size: usize,
    pub default_page_size: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub scan_deadline: Duration,
    pub pattern_cap: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            scan_cap: DEFAULT_SCAN_CAP,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            scan_deadline: DEFAULT_SCAN_DEADLINE,
            pattern_cap: DEFAULT_PATTERN_CAP,
        }
    }
}

impl Configuration {
    /// Applies optional overrides, keeping every value inside a workable range.
    pub fn with_overrides(
        batch_size: Option<usize>,
        scan_cap: Option<usize>,
        max_page_size: Option<usize>,
        cache_ttl: Option<Duration>,
        cache_capacity: Option<u64>,
        scan_deadline: Option<Duration>,
        pattern_cap: Option<usize>,
    ) -> Self {
        let defaults = Self::default();

        let batch_size = batch_size.unwrap_or(defaults.batch_size).max(1);
        let scan_cap = scan_cap.unwrap_or(defaults.scan_cap).max(batch_size);
        let max_page_size = max_page_size.unwrap_or(defaults.max_page_size).max(1);

        Self {
            batch_size,
            scan_cap,
            max_page_size,
            default_page_size: defaults.default_page_size.min(max_page_size),
            cache_ttl: cache_ttl.unwrap_or(defaults.cache_ttl),
            cache_capacity: cache_capacity.unwrap_or(defaults.cache_capacity).max(1),
            scan_deadline: scan_deadline.unwrap_or(defaults.scan_deadline),
            pattern_cap: pattern_cap.unwrap_or(defaults.pattern_cap).max(1),
        }
    }

    /// Clamps a requested page size into `1..=max_page_size`.
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        let config = Configuration::default();
        assert_eq!(config.clamp_page_size(Some(50_000)), DEFAULT_MAX_PAGE_SIZE);
        assert_eq!(config.clamp_page_size(Some(0)), 1);
        assert_eq!(config.clamp_page_size(None), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_scan_cap_never_below_batch() {
        let config = Configuration::with_overrides(Some(500), Some(10), None, None, None, None, None);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.scan_cap, 500);
    }
}
