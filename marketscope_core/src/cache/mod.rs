pub mod aggregation_cache;
pub mod clock;

pub use aggregation_cache::{AggregationCache, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
