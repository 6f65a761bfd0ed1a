//! Mandatory metric names (§4.5). Centralized so producers and any future
//! consumer agree on spelling without importing each other's crates.

pub const EVENTS_RECEIVED: &str = "hearth_events_received_total";
pub const EVENTS_PROCESSED: &str = "hearth_events_processed_total";
pub const EVENTS_DROPPED: &str = "hearth_events_dropped_total";
pub const EVENTS_FILTERED: &str = "hearth_events_filtered_total";
pub const PIPELINE_QUEUE_DEPTH: &str = "hearth_pipeline_queue_depth";
pub const BATCH_SIZE: &str = "hearth_batch_size";
pub const BATCH_WRITE_DURATION_SECONDS: &str = "hearth_batch_write_duration_seconds";
pub const BATCH_AGE_AT_FLUSH_SECONDS: &str = "hearth_batch_age_at_flush_seconds";
pub const COMPRESSION_RATIO: &str = "hearth_compression_ratio";
pub const WRITER_RETRY_COUNT: &str = "hearth_writer_retry_count_total";
pub const CIRCUIT_BREAKER_STATE: &str = "hearth_circuit_breaker_state";
pub const FILTER_CACHE_HIT_RATE: &str = "hearth_filter_cache_hit_rate";
pub const ENRICHER_CACHE_HIT_RATE: &str = "hearth_enricher_cache_hit_rate";
pub const ALERTS_TRIGGERED: &str = "hearth_alerts_triggered_total";
pub const ALERTS_NOTIFICATIONS_SENT: &str = "hearth_alerts_notifications_sent_total";
pub const PROGRAMMER_ERRORS: &str = "hearth_programmer_errors_total";
