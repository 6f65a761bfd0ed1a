use crate::backoff::retry_delay;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus};
use crate::compression::compress;
use crate::error::{Result, WriterError};
use crate::optimize::{detect_workload, optimize};
use crate::stats::{BatchPerformance, WriterStats, WriterStatsCollector};
use hearth_config::{BackoffSettings, Compression, WriterSettings};
use hearth_model::{line_protocol, StoragePoint};
use hearth_observability::{labels, names, MetricsRegistry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct BatchConfig {
    batch_size: usize,
    batch_timeout: Duration,
    compression: Compression,
    compression_level: u32,
    optimization_enabled: bool,
}

/// Batching HTTP writer for the time-series backend (§4.3): accumulates
/// points until `batch_size` or `batch_timeout` is reached, optionally
/// optimizes and compresses the batch, then POSTs it with retry and a
/// circuit breaker guarding the write path.
pub struct Writer {
    http: reqwest::Client,
    database_url: String,
    database_org: String,
    database_bucket: String,
    database_token: String,
    backoff: BackoffSettings,
    config: Mutex<BatchConfig>,
    pending: AsyncMutex<VecDeque<StoragePoint>>,
    batch_started_at: Mutex<Option<Instant>>,
    circuit: CircuitBreaker,
    stats: WriterStatsCollector,
    metrics: Arc<MetricsRegistry>,
    connected: AtomicBool,
    batch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Writer {
    pub fn new(settings: &WriterSettings, metrics: Arc<MetricsRegistry>) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.write_timeout)
            .build()
            .map_err(WriterError::Transport)?;

        Ok(Arc::new(Self {
            http,
            database_url: settings.database_url.clone(),
            database_org: settings.database_org.clone(),
            database_bucket: settings.database_bucket.clone(),
            database_token: settings.database_token.clone(),
            backoff: settings.backoff,
            config: Mutex::new(BatchConfig {
                batch_size: settings.batch_size,
                batch_timeout: settings.batch_timeout,
                compression: settings.compression,
                compression_level: settings.compression_level,
                optimization_enabled: settings.batch_optimization_enabled,
            }),
            pending: AsyncMutex::new(VecDeque::new()),
            batch_started_at: Mutex::new(None),
            circuit: CircuitBreaker::new(settings.circuit_breaker_failure_threshold, settings.circuit_breaker_timeout),
            stats: WriterStatsCollector::new(),
            metrics,
            connected: AtomicBool::new(false),
            batch_task: Mutex::new(None),
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Verifies the backend is reachable, then starts the background
    /// batch-timeout flusher.
    pub async fn connect(self: &Arc<Self>) -> Result<bool> {
        if self.is_connected() {
            warn!("writer already connected");
            return Ok(true);
        }

        let url = format!("{}/health", self.database_url);
        let healthy = match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                error!(error = %e, "error testing backend connection");
                false
            }
        };

        if !healthy {
            return Ok(false);
        }

        self.connected.store(true, Ordering::Relaxed);
        self.start_batch_timer();
        info!(url = %self.database_url, "connected to time-series backend");
        Ok(true)
    }

    pub async fn disconnect(self: &Arc<Self>) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        if let Some(handle) = self.batch_task.lock().expect("batch task mutex poisoned").take() {
            handle.abort();
        }
        let _ = self.flush().await;
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn start_batch_timer(self: &Arc<Self>) {
        let writer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let timeout = writer.config.lock().expect("batch config mutex poisoned").batch_timeout;
                tokio::time::sleep(timeout).await;
                if !writer.is_connected() {
                    return;
                }
                if let Err(e) = writer.flush().await {
                    warn!(error = %e, "periodic batch flush failed");
                }
            }
        });
        *self.batch_task.lock().expect("batch task mutex poisoned") = Some(handle);
    }

    pub async fn write_point(self: &Arc<Self>, point: StoragePoint) -> Result<bool> {
        if !self.is_connected() {
            return Err(WriterError::NotConnected);
        }

        let should_flush = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                *self.batch_started_at.lock().expect("batch start mutex poisoned") = Some(Instant::now());
            }
            pending.push_back(point);
            let batch_size = self.config.lock().expect("batch config mutex poisoned").batch_size;
            pending.len() >= batch_size
        };

        if should_flush {
            self.flush().await?;
        }
        Ok(true)
    }

    pub async fn write_points(self: &Arc<Self>, points: Vec<StoragePoint>) -> Result<bool> {
        if !self.is_connected() {
            return Err(WriterError::NotConnected);
        }
        let count = points.len();
        for point in points {
            self.write_point(point).await?;
        }
        self.flush().await?;
        Ok(count > 0)
    }

    pub async fn flush(self: &Arc<Self>) -> Result<bool> {
        if !self.is_connected() {
            return Ok(false);
        }

        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(true);
        }
        let points: Vec<StoragePoint> = pending.drain(..).collect();
        drop(pending);

        let batch_age = self
            .batch_started_at
            .lock()
            .expect("batch start mutex poisoned")
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();

        let config_snapshot = {
            let config = self.config.lock().expect("batch config mutex poisoned");
            (config.compression, config.compression_level, config.optimization_enabled)
        };
        let (compression, compression_level, optimization_enabled) = config_snapshot;

        let original_count = points.len();
        let points = if optimization_enabled {
            let workload = detect_workload(&points);
            optimize(points, workload)
        } else {
            points
        };

        let mut valid_points = Vec::with_capacity(points.len());
        for point in points {
            match point.validate() {
                Ok(()) => valid_points.push(point),
                Err(e) => {
                    warn!(error = %e, measurement = %point.measurement, "dropping invalid point from batch");
                    self.stats.record_batch_failure(1);
                }
            }
        }

        if valid_points.is_empty() {
            return Ok(true);
        }

        self.metrics
            .observe_histogram(names::BATCH_SIZE, &[10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0], labels(&[]), valid_points.len() as f64);
        self.metrics
            .observe_histogram(names::BATCH_AGE_AT_FLUSH_SECONDS, hearth_observability::DEFAULT_LATENCY_BUCKETS, labels(&[]), batch_age.as_secs_f64());

        let started = Instant::now();
        let result = self.send_batch(&valid_points, compression, compression_level).await;
        let write_duration = started.elapsed();

        self.metrics
            .observe_histogram(names::BATCH_WRITE_DURATION_SECONDS, hearth_observability::DEFAULT_LATENCY_BUCKETS, labels(&[]), write_duration.as_secs_f64());

        match result {
            Ok(()) => {
                self.stats.record_batch_success(valid_points.len(), write_duration, batch_age);
                self.metrics.set_gauge(names::CIRCUIT_BREAKER_STATE, labels(&[]), 0);
                debug!(points = valid_points.len(), batch_age_ms = batch_age.as_millis(), "flushed batch");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, points = valid_points.len(), "failed to flush batch, returning to queue");
                self.stats.record_batch_failure(valid_points.len());
                // Head-insert: failed points are retried before anything
                // submitted after them, preserving arrival order.
                let mut pending = self.pending.lock().await;
                for point in valid_points.into_iter().rev() {
                    pending.push_front(point);
                }
                let gauge = match self.circuit.status().state {
                    crate::circuit_breaker::CircuitState::Open => 2,
                    crate::circuit_breaker::CircuitState::HalfOpen => 1,
                    crate::circuit_breaker::CircuitState::Closed => 0,
                };
                self.metrics.set_gauge(names::CIRCUIT_BREAKER_STATE, labels(&[]), gauge);
                Ok(false)
            }
        }
    }

    async fn send_batch(&self, points: &[StoragePoint], compression: Compression, compression_level: u32) -> Result<()> {
        if !self.circuit.allow_request() {
            return Err(WriterError::CircuitOpen);
        }

        let body = line_protocol::encode_batch(points);
        let url = format!("{}/api/v2/write", self.database_url);
        let max_retries = self.backoff.max_retries.max(0) as u32;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                self.metrics.incr_counter(names::WRITER_RETRY_COUNT, labels(&[]), 1);
            }

            let (payload, encoding) = compress(&body, compression, compression_level);
            let mut request = self
                .http
                .post(&url)
                .query(&[
                    ("org", self.database_org.as_str()),
                    ("bucket", self.database_bucket.as_str()),
                    ("precision", "ns"),
                ])
                .header("Authorization", format!("Token {}", self.database_token))
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(payload);
            if encoding != "identity" {
                request = request.header("Content-Encoding", encoding);
            }

            match request.send().await {
                Ok(response) if response.status().as_u16() == 204 => {
                    self.circuit.record_success();
                    return Ok(());
                }
                Ok(response) if response.status().as_u16() == 429 => {
                    if attempt < max_retries {
                        tokio::time::sleep(retry_delay(&self.backoff, attempt + 1)).await;
                        continue;
                    }
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    if attempt < max_retries {
                        tokio::time::sleep(retry_delay(&self.backoff, attempt + 1)).await;
                        continue;
                    }
                    self.circuit.record_failure();
                    return Err(WriterError::BackendRejected { status, body });
                }
                Err(e) => {
                    if attempt < max_retries {
                        tokio::time::sleep(retry_delay(&self.backoff, attempt + 1)).await;
                        continue;
                    }
                    self.circuit.record_failure();
                    return Err(WriterError::Transport(e));
                }
            }
        }

        self.circuit.record_failure();
        Err(WriterError::BackendRejected {
            status: 429,
            body: "rate limited after exhausting retries".to_string(),
        })
    }

    pub fn update_batch_config(
        &self,
        batch_size: Option<usize>,
        batch_timeout: Option<Duration>,
        compression: Option<Compression>,
        compression_level: Option<u32>,
        optimization_enabled: Option<bool>,
    ) -> Result<()> {
        if let Some(size) = batch_size {
            if !(1..=10_000).contains(&size) {
                return Err(WriterError::InvalidConfig("batch_size must be between 1 and 10000".to_string()));
            }
        }
        if let Some(level) = compression_level {
            if !(1..=9).contains(&level) {
                return Err(WriterError::InvalidConfig("compression_level must be between 1 and 9".to_string()));
            }
        }

        let mut config = self.config.lock().expect("batch config mutex poisoned");
        if let Some(size) = batch_size {
            config.batch_size = size;
        }
        if let Some(timeout) = batch_timeout {
            config.batch_timeout = timeout;
        }
        if let Some(compression) = compression {
            config.compression = compression;
        }
        if let Some(level) = compression_level {
            config.compression_level = level;
        }
        if let Some(enabled) = optimization_enabled {
            config.optimization_enabled = enabled;
        }
        Ok(())
    }

    pub async fn stats(&self) -> WriterStats {
        let pending = self.pending.lock().await.len();
        self.stats.snapshot(pending)
    }

    pub fn batch_performance(&self) -> BatchPerformance {
        self.stats.batch_performance()
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.circuit.status()
    }
}
