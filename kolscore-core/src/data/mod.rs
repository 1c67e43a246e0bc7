//! Price acquisition: upstream sources, on-disk cache, retrying fetcher, batching.

pub mod batch;
pub mod cache;
pub mod circuit_breaker;
pub mod fetcher;
pub mod pacing;
pub mod provider;
pub mod yahoo;

pub use batch::{acquire_owned, AcquireSummary, Acquisition, BatchAcquirer, BatchOptions};
pub use cache::{CacheEntry, CacheStatus, PriceCache, DEFAULT_TTL};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use fetcher::{ResilientFetcher, RetryPolicy};
pub use pacing::{RecordingSleeper, Sleeper, ThreadSleeper};
pub use provider::{
    Capabilities, DataError, DownloadOptions, PriceTable, UpstreamError, UpstreamPriceSource,
};
pub use yahoo::YahooSource;
