//! Batching HTTP writer for the time-series backend (§4.3): size/age
//! triggered batches, workload-aware optimization, compression, retry with
//! a circuit breaker, and failed-batch requeueing.

pub mod backoff;
pub mod circuit_breaker;
pub mod compression;
pub mod error;
pub mod optimize;
pub mod stats;
pub mod writer;

pub use circuit_breaker::{CircuitBreakerStatus, CircuitState};
pub use error::{Result, WriterError};
pub use optimize::WorkloadType;
pub use stats::{BatchPerformance, WriterStats};
pub use writer::Writer;
