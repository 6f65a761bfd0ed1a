//! Metrics registry and health aggregation shared by every hearth
//! component. No component terminates on a reportable failure; instead it
//! calls into this crate so the failure is visible on `/health` and
//! `/metrics` (§4.5, §7).

pub mod health;
pub mod metrics;
pub mod names;

pub use health::{Criticality, DependencyReport, DependencyStatus, HealthRegistry, HealthSummary};
pub use metrics::{labels, Labels, MetricsRegistry, DEFAULT_LATENCY_BUCKETS};
