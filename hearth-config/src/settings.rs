use crate::env_helpers::{optional_csv, optional_parsed, optional_secs, optional_string, required};
use crate::error::{ConfigError, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Deflate,
    None,
}

impl std::str::FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            "deflate" => Ok(Compression::Deflate),
            "none" | "identity" => Ok(Compression::None),
            other => Err(ConfigError::Invalid {
                name: "WRITER_COMPRESSION",
                value: other.to_string(),
                reason: "expected gzip, deflate, or none".to_string(),
            }),
        }
    }
}

/// Retry/backoff parameters shared by the connection manager and the writer
/// (§4.1 retry policy, §4.3 HTTP semantics). Both use the same formula:
/// `min(max_delay, base_delay * multiplier^(n-1)) * (1 + U(-jitter, jitter))`,
/// floored at 0.1s.
#[derive(Debug, Clone, Copy)]
pub struct BackoffSettings {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
    /// -1 means infinite.
    pub max_retries: i64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: 0.1,
            max_retries: -1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub upstream_url: String,
    pub upstream_token: String,
    pub subscribed_event_types: Vec<String>,
    pub subscribe_ack_timeout: Duration,
    pub backoff: BackoffSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub dedup_window: Duration,
    pub dedup_cache_capacity: usize,
    pub rate_limit_per_sec: u32,
    pub overflow_spill_dir: Option<PathBuf>,
    pub filter_cache_capacity: usize,
    pub pattern_cache_capacity: usize,
    pub enrichment_ttl: Duration,
    pub enrichment_cache_capacity: usize,
    pub enrichment_rate_limit_per_sec: u32,
    pub enrichment_api_key: Option<String>,
    pub enrichment_base_url: String,
}

#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub database_url: String,
    pub database_org: String,
    pub database_bucket: String,
    pub database_token: String,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub compression: Compression,
    pub compression_level: u32,
    pub batch_optimization_enabled: bool,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub backoff: BackoffSettings,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub check_interval: Duration,
    pub aggregation_window: Duration,
    pub history_capacity: usize,
    pub min_data_points: usize,
    pub series_retention: Duration,
    pub series_max_samples: usize,
}

#[derive(Debug, Clone)]
pub struct ObservabilitySettings {
    pub health_bind_addr: String,
    pub metrics_bind_addr: String,
    pub quiet_subscription_gap: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub pipeline: PipelineSettings,
    pub writer: WriterSettings,
    pub alerts: AlertSettings,
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Single entry point: load `.env` if present (teacher's
    /// `dotenvy::dotenv().ok()` idiom), then read every variable, applying
    /// documented defaults. Fails fast and synchronously on the first
    /// missing/invalid required variable.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let connection = ConnectionSettings {
            upstream_url: required("HEARTH_UPSTREAM_URL")?,
            upstream_token: required("HEARTH_UPSTREAM_TOKEN")?,
            subscribed_event_types: optional_csv("HEARTH_SUBSCRIBE_EVENT_TYPES", &["state_changed"]),
            subscribe_ack_timeout: optional_secs("HEARTH_SUBSCRIBE_ACK_TIMEOUT_SECS", 5.0)?,
            backoff: BackoffSettings {
                base_delay: optional_secs("HEARTH_CONN_BACKOFF_BASE_SECS", 1.0)?,
                multiplier: optional_parsed("HEARTH_CONN_BACKOFF_MULTIPLIER", 2.0)?,
                max_delay: optional_secs("HEARTH_CONN_BACKOFF_MAX_SECS", 300.0)?,
                jitter: optional_parsed("HEARTH_CONN_BACKOFF_JITTER", 0.1)?,
                max_retries: optional_parsed("HEARTH_CONN_MAX_RETRIES", -1_i64)?,
            },
        };

        let pipeline = PipelineSettings {
            queue_capacity: optional_parsed("HEARTH_QUEUE_CAPACITY", 10_000_usize)?,
            worker_count: optional_parsed("HEARTH_WORKER_COUNT", 10_usize)?,
            dedup_window: optional_secs("HEARTH_DEDUP_WINDOW_SECS", 5.0)?,
            dedup_cache_capacity: optional_parsed("HEARTH_DEDUP_CACHE_CAPACITY", 10_000_usize)?,
            rate_limit_per_sec: optional_parsed("HEARTH_RATE_LIMIT_PER_SEC", 1_000_u32)?,
            overflow_spill_dir: std::env::var("HEARTH_OVERFLOW_SPILL_DIR").ok().map(PathBuf::from),
            filter_cache_capacity: optional_parsed("HEARTH_FILTER_CACHE_CAPACITY", 1_000_usize)?,
            pattern_cache_capacity: optional_parsed("HEARTH_PATTERN_CACHE_CAPACITY", 1_000_usize)?,
            enrichment_ttl: optional_secs("HEARTH_ENRICHMENT_TTL_SECS", 300.0)?,
            enrichment_cache_capacity: optional_parsed("HEARTH_ENRICHMENT_CACHE_CAPACITY", 1_000_usize)?,
            enrichment_rate_limit_per_sec: optional_parsed("HEARTH_ENRICHMENT_RATE_LIMIT_PER_SEC", 1_u32)?,
            enrichment_api_key: std::env::var("HEARTH_ENRICHMENT_API_KEY").ok(),
            enrichment_base_url: optional_string(
                "HEARTH_ENRICHMENT_BASE_URL",
                "https://api.openweathermap.org/data/2.5/weather",
            ),
        };

        let writer = WriterSettings {
            database_url: required("HEARTH_DATABASE_URL")?,
            database_org: required("HEARTH_DATABASE_ORG")?,
            database_bucket: required("HEARTH_DATABASE_BUCKET")?,
            database_token: required("HEARTH_DATABASE_TOKEN")?,
            batch_size: optional_parsed("HEARTH_BATCH_SIZE", 1_000_usize)?,
            batch_timeout: optional_secs("HEARTH_BATCH_TIMEOUT_SECS", 10.0)?,
            compression: optional_parsed("HEARTH_WRITER_COMPRESSION", Compression::Gzip)?,
            compression_level: optional_parsed("HEARTH_WRITER_COMPRESSION_LEVEL", 6_u32)?,
            batch_optimization_enabled: optional_parsed("HEARTH_BATCH_OPTIMIZATION_ENABLED", true)?,
            connect_timeout: optional_secs("HEARTH_WRITER_CONNECT_TIMEOUT_SECS", 5.0)?,
            write_timeout: optional_secs("HEARTH_WRITER_WRITE_TIMEOUT_SECS", 10.0)?,
            backoff: BackoffSettings {
                base_delay: optional_secs("HEARTH_WRITER_BACKOFF_BASE_SECS", 1.0)?,
                multiplier: optional_parsed("HEARTH_WRITER_BACKOFF_MULTIPLIER", 2.0)?,
                max_delay: optional_secs("HEARTH_WRITER_BACKOFF_MAX_SECS", 60.0)?,
                jitter: optional_parsed("HEARTH_WRITER_BACKOFF_JITTER", 0.1)?,
                max_retries: optional_parsed("HEARTH_WRITER_MAX_RETRIES", 5_i64)?,
            },
            circuit_breaker_failure_threshold: optional_parsed("HEARTH_CB_FAILURE_THRESHOLD", 5_u32)?,
            circuit_breaker_timeout: optional_secs("HEARTH_CB_TIMEOUT_SECS", 60.0)?,
        };

        let alerts = AlertSettings {
            check_interval: optional_secs("HEARTH_ALERT_CHECK_INTERVAL_SECS", 15.0)?,
            aggregation_window: optional_secs("HEARTH_ALERT_AGGREGATION_WINDOW_SECS", 300.0)?,
            history_capacity: optional_parsed("HEARTH_ALERT_HISTORY_CAPACITY", 1_000_usize)?,
            min_data_points: optional_parsed("HEARTH_ALERT_MIN_DATA_POINTS", 3_usize)?,
            series_retention: optional_secs("HEARTH_ALERT_SERIES_RETENTION_SECS", 86_400.0)?,
            series_max_samples: optional_parsed("HEARTH_ALERT_SERIES_MAX_SAMPLES", 10_000_usize)?,
        };

        let observability = ObservabilitySettings {
            health_bind_addr: optional_string("HEARTH_HEALTH_BIND_ADDR", "0.0.0.0:8080"),
            metrics_bind_addr: optional_string("HEARTH_METRICS_BIND_ADDR", "0.0.0.0:9090"),
            quiet_subscription_gap: optional_secs("HEARTH_QUIET_SUBSCRIPTION_GAP_SECS", 60.0)?,
        };

        Ok(Self {
            connection,
            pipeline,
            writer,
            alerts,
            observability,
        })
    }
}
