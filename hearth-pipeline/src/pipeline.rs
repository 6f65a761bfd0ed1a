use crate::dedup::{fingerprint, DedupWindow};
use crate::enrichment::{enrich, EnrichmentCache, Enricher};
use crate::filters::FilterChain;
use crate::queue::{SubmitOutcome, WorkQueue};
use crate::rate_limiter::TokenBucket;
use crate::stats::{PipelineStats, StatsCollector};
use crate::transform::{DefaultTransform, Transform};
use dashmap::DashMap;
use hearth_connection::RegistryCache;
use hearth_config::PipelineSettings;
use hearth_model::{Event, StoragePoint};
use hearth_observability::{labels, names, MetricsRegistry};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct EnrichmentSetup {
    enricher: Arc<dyn Enricher>,
    cache: EnrichmentCache,
    rate_limiter: TokenBucket,
    fallback_enabled: bool,
}

/// Top-level event-processing pipeline (§4.2): a bounded work queue feeding
/// a fixed worker pool, each worker running dedup, the filter chain,
/// enrichment, and a transform before dispatching storage points and raw
/// events to their downstream consumers.
pub struct Pipeline {
    queue: Arc<WorkQueue>,
    dedup: Arc<DedupWindow>,
    filters: Arc<RwLock<FilterChain>>,
    transforms: Arc<DashMap<String, Arc<dyn Transform>>>,
    default_transform: Arc<dyn Transform>,
    enrichment: Option<Arc<EnrichmentSetup>>,
    registry: Option<Arc<RegistryCache>>,
    submission_limiter: TokenBucket,
    stats: Arc<StatsCollector>,
    metrics: Arc<MetricsRegistry>,
    worker_count: usize,
    point_tx: mpsc::Sender<StoragePoint>,
    event_tx: Option<mpsc::Sender<Event>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    drainer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        settings: &PipelineSettings,
        metrics: Arc<MetricsRegistry>,
        registry: Option<Arc<RegistryCache>>,
        point_tx: mpsc::Sender<StoragePoint>,
        event_tx: Option<mpsc::Sender<Event>>,
    ) -> Arc<Self> {
        let (queue, receiver) = WorkQueue::new(settings.queue_capacity, settings.overflow_spill_dir.clone());

        let enrichment = if settings.enrichment_rate_limit_per_sec > 0 {
            let enricher: Arc<dyn Enricher> = Arc::new(crate::enrichment::WeatherEnricher::new(
                settings.enrichment_base_url.clone(),
                settings.enrichment_api_key.clone(),
                std::time::Duration::from_secs(5),
            ));
            Some(Arc::new(EnrichmentSetup {
                enricher,
                cache: EnrichmentCache::new(settings.enrichment_ttl, settings.enrichment_cache_capacity),
                rate_limiter: TokenBucket::new(settings.enrichment_rate_limit_per_sec),
                fallback_enabled: true,
            }))
        } else {
            None
        };

        let pipeline = Arc::new(Self {
            queue: Arc::new(queue),
            dedup: Arc::new(DedupWindow::new(settings.dedup_window, settings.dedup_cache_capacity)),
            filters: Arc::new(RwLock::new(FilterChain::new(settings.filter_cache_capacity))),
            transforms: Arc::new(DashMap::new()),
            default_transform: Arc::new(DefaultTransform),
            enrichment,
            registry,
            submission_limiter: TokenBucket::new(settings.rate_limit_per_sec),
            stats: Arc::new(StatsCollector::new()),
            metrics,
            worker_count: settings.worker_count.max(1),
            point_tx,
            event_tx,
            workers: std::sync::Mutex::new(Vec::new()),
            drainer: std::sync::Mutex::new(None),
        });

        pipeline.spawn_workers(receiver);
        pipeline
    }

    fn spawn_workers(self: &Arc<Self>, receiver: mpsc::Receiver<Event>) {
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut handles = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let pipeline = Arc::clone(self);
            let receiver = Arc::clone(&receiver);
            handles.push(tokio::spawn(async move { pipeline.run_worker(receiver).await }));
        }
        *self.workers.lock().expect("workers mutex poisoned") = handles;

        let pipeline = Arc::clone(self);
        let drainer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(500));
            loop {
                ticker.tick().await;
                pipeline.queue.drain_overflow();
                pipeline
                    .metrics
                    .set_gauge(names::PIPELINE_QUEUE_DEPTH, labels(&[]), pipeline.queue.overflow_len() as i64);
            }
        });
        *self.drainer.lock().expect("drainer mutex poisoned") = Some(drainer);
    }

    async fn run_worker(self: Arc<Self>, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Event>>>) {
        loop {
            let event = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(event) = event else {
                return;
            };
            self.process_event(event).await;
        }
    }

    /// Recovers any events spilled to disk from a previous run. Call once at
    /// startup before accepting new submissions.
    pub async fn recover_spilled(&self) -> std::io::Result<usize> {
        self.queue.recover_spilled().await
    }

    pub fn register_filter(&self, filter: Box<dyn crate::filters::Filter>) {
        self.filters.write().expect("filter chain lock poisoned").register(filter);
    }

    pub fn register_transform(&self, event_type: impl Into<String>, transform: Arc<dyn Transform>) {
        self.transforms.insert(event_type.into(), transform);
    }

    /// Evaluated synchronously at the queue boundary; everything else
    /// (dedup, filtering, enrichment, transform) happens later inside a
    /// worker after the event has been dequeued.
    pub fn submit(&self, event: Event) -> SubmitOutcome {
        self.stats.record_submitted();
        self.metrics.incr_counter(names::EVENTS_RECEIVED, labels(&[]), 1);

        if !self.submission_limiter.try_acquire() {
            self.metrics
                .incr_counter(names::EVENTS_DROPPED, labels(&[("reason", "rate_limited")]), 1);
            return SubmitOutcome::RateLimited;
        }

        let outcome = self.queue.try_enqueue(event);
        if outcome == SubmitOutcome::DroppedOverflow {
            self.metrics
                .incr_counter(names::EVENTS_DROPPED, labels(&[("reason", "overflow")]), 1);
        }
        outcome
    }

    async fn process_event(&self, event: Event) {
        let started = Instant::now();

        if !self.dedup.check_and_insert(fingerprint(&event)) {
            self.stats.record_deduplicated();
            self.metrics
                .incr_counter(names::EVENTS_DROPPED, labels(&[("reason", "duplicate")]), 1);
            return;
        }

        let (filter_results, outcome) = self.filters.read().expect("filter chain lock poisoned").evaluate(event);
        for result in &filter_results {
            if result.panicked {
                self.metrics.incr_counter(
                    names::PROGRAMMER_ERRORS,
                    labels(&[("site", "filter"), ("filter", result.filter_name.as_str())]),
                    1,
                );
            }
        }
        let Some(event) = outcome else {
            self.stats.record_filtered();
            self.metrics.incr_counter(names::EVENTS_FILTERED, labels(&[]), 1);
            return;
        };

        let event = match &self.enrichment {
            Some(setup) => {
                enrich(event, setup.enricher.as_ref(), &setup.cache, &setup.rate_limiter, setup.fallback_enabled).await
            }
            None => event,
        };

        if let Some(event_tx) = &self.event_tx {
            if event_tx.send(event.clone()).await.is_err() {
                debug!("event fan-out receiver dropped");
            }
        }

        let registry_attrs = self.registry.as_ref().and_then(|r| r.lookup(&event.entity_id));
        let transform = self
            .transforms
            .get(&event.event_type)
            .map(|t| Arc::clone(t.value()))
            .unwrap_or_else(|| Arc::clone(&self.default_transform));

        let points = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            transform.transform(&event, registry_attrs.as_ref())
        })) {
            Ok(points) => points,
            Err(payload) => {
                let error = crate::error::PipelineError::TransformPanicked {
                    message: crate::error::panic_message(&*payload),
                };
                warn!(%error, event_type = %event.event_type, "transform panicked, falling back to the default transform");
                self.metrics
                    .incr_counter(names::PROGRAMMER_ERRORS, labels(&[("site", "transform")]), 1);
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    self.default_transform.transform(&event, registry_attrs.as_ref())
                })) {
                    Ok(points) => points,
                    Err(_) => Vec::new(),
                }
            }
        };
        self.stats.record_transformed(points.len() as u64);

        for point in points {
            if let Err(e) = point.validate() {
                warn!(error = %e, measurement = %point.measurement, "dropping invalid storage point");
                self.stats.record_failed();
                continue;
            }
            if self.point_tx.send(point).await.is_err() {
                warn!("storage point receiver dropped, pipeline has no writer attached");
                self.stats.record_failed();
            } else {
                self.stats.record_stored();
                self.metrics.incr_counter(names::EVENTS_PROCESSED, labels(&[]), 1);
            }
        }

        self.metrics
            .observe_histogram("hearth_pipeline_latency_seconds", hearth_observability::DEFAULT_LATENCY_BUCKETS, labels(&[]), started.elapsed().as_secs_f64());
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot(self.queue.overflow_len())
    }

    pub fn cache_hit_rate(&self, filter_name: &str) -> Option<f64> {
        self.filters.read().expect("filter chain lock poisoned").cache_hit_rate(filter_name)
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.drainer.lock().expect("drainer mutex poisoned").take() {
            handle.abort();
        }
        let handles = std::mem::take(&mut *self.workers.lock().expect("workers mutex poisoned"));
        for handle in handles {
            handle.abort();
        }
    }
}
