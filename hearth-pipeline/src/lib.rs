//! Event-processing pipeline (§4.2): deduplication, an ordered filter
//! chain, enrichment, transform into storage points, and a bounded worker
//! pool with overflow buffering and disk spill.

pub mod dedup;
pub mod enrichment;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod queue;
pub mod rate_limiter;
pub mod spill;
pub mod stats;
pub mod transform;

pub use dedup::DedupWindow;
pub use enrichment::{EnrichmentCache, Enricher, WeatherEnricher};
pub use error::{PipelineError, Result};
pub use filters::{Filter, FilterChain};
pub use pipeline::Pipeline;
pub use queue::SubmitOutcome;
pub use rate_limiter::TokenBucket;
pub use stats::{PipelineStats, StatsCollector};
pub use transform::{DefaultTransform, Transform};
