// Number of records requested per page during a full scan
pub const DEFAULT_BATCH_SIZE: usize = 1000;

// Upper bound of records visited by a single full scan
pub const DEFAULT_SCAN_CAP: usize = 50_000;

// Largest page a list endpoint may request
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1000;

pub const DEFAULT_PAGE_SIZE: usize = 25;

pub const DEFAULT_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);

pub const DEFAULT_CACHE_CAPACITY: u64 = 1024;

pub const DEFAULT_SCAN_DEADLINE: std::time::Duration = std::time::Duration::from_secs(30);

// Maximum candidates enumerated for a range over a formatted text column
pub const DEFAULT_PATTERN_CAP: usize = 200;

/// Filter value meaning "no constraint".
pub const SENTINEL_ALL: &str = "all";

pub mod core;

pub mod cache;
pub mod configuration;
pub mod error;
pub mod source;

pub use crate::cache::{AggregationCache, Clock, ManualClock, SystemClock};
pub use crate::configuration::Configuration;
pub use crate::core::engine::{Engine, Page};
pub use crate::error::{EngineError, SourceError};
pub use crate::source::{DataSource, memory::MemorySource, postgrest::PostgrestSource, SourceBackend};
