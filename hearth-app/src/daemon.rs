use crate::http;
use hearth_alerts::{AlertEngine, LoggingSink};
use hearth_config::Settings;
use hearth_connection::{ConnectionManager, ConnectionState, WebSocketTransportFactory};
use hearth_model::{Event, StoragePoint};
use hearth_observability::{Criticality, DependencyStatus, HealthRegistry, MetricsRegistry};
use hearth_pipeline::{Pipeline, SubmitOutcome};
use hearth_writer::{CircuitState, Writer};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const POINT_CHANNEL_CAPACITY: usize = 1_024;
const ALERT_EVENT_CHANNEL_CAPACITY: usize = 1_024;
const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// No event received yet; the quiet-gap check is suppressed until the first
/// one arrives so a freshly started daemon doesn't report itself degraded.
const NO_EVENT_YET: i64 = -1;

/// Composition root (§5 "Concurrency & Resource Model"): owns every
/// long-lived component and the background tasks that connect them, so
/// shutdown can stop them in a fixed order instead of relying on drop order.
pub struct Daemon {
    settings: Settings,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthRegistry>,
    connection: Arc<ConnectionManager>,
    pipeline: Arc<Pipeline>,
    writer: Arc<Writer>,
    alerts: Arc<AlertEngine>,
    started_at: Instant,
    last_event_secs: AtomicI64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Daemon {
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let metrics = Arc::new(MetricsRegistry::new());
        let health = Arc::new(HealthRegistry::new());

        let writer = Writer::new(&settings.writer, metrics.clone())?;
        match writer.connect().await {
            Ok(true) => info!(url = %settings.writer.database_url, "writer connected to time-series backend"),
            Ok(false) => warn!("writer backend health check failed at startup, continuing disconnected"),
            Err(error) => warn!(%error, "writer connect attempt failed at startup, continuing disconnected"),
        }

        let factory = Arc::new(WebSocketTransportFactory {
            url: settings.connection.upstream_url.clone(),
        });
        let connection = Arc::new(ConnectionManager::new(settings.connection.clone(), factory));

        let (point_tx, point_rx) = mpsc::channel::<StoragePoint>(POINT_CHANNEL_CAPACITY);
        let (alert_event_tx, alert_event_rx) = mpsc::channel::<Event>(ALERT_EVENT_CHANNEL_CAPACITY);

        let pipeline = Pipeline::new(
            &settings.pipeline,
            metrics.clone(),
            Some(connection.registry()),
            point_tx,
            Some(alert_event_tx),
        );

        let alerts = AlertEngine::new(&settings.alerts, metrics.clone());
        alerts.register_sink(Arc::new(LoggingSink::new("log")));

        match pipeline.recover_spilled().await {
            Ok(0) => {}
            Ok(count) => info!(count, "recovered spilled events from a previous run"),
            Err(error) => warn!(%error, "failed to recover spilled events from a previous run"),
        }

        let daemon = Arc::new(Self {
            settings,
            metrics,
            health,
            connection,
            pipeline,
            writer,
            alerts,
            started_at: Instant::now(),
            last_event_secs: AtomicI64::new(NO_EVENT_YET),
            tasks: Mutex::new(Vec::new()),
        });

        daemon.spawn_point_forwarder(point_rx);
        daemon.spawn_alert_forwarder(alert_event_rx);
        daemon.spawn_health_reporter();

        Ok(daemon)
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().expect("task list poisoned").push(handle);
    }

    fn spawn_point_forwarder(self: &Arc<Self>, mut point_rx: mpsc::Receiver<StoragePoint>) {
        let writer = self.writer.clone();
        let handle = tokio::spawn(async move {
            while let Some(point) = point_rx.recv().await {
                if let Err(error) = writer.write_point(point).await {
                    error!(%error, "writer rejected a point from the pipeline");
                }
            }
        });
        self.push_task(handle);
    }

    fn spawn_alert_forwarder(self: &Arc<Self>, mut alert_event_rx: mpsc::Receiver<Event>) {
        let alerts = self.alerts.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = alert_event_rx.recv().await {
                alerts.check_event(&event);
            }
        });
        self.push_task(handle);
    }

    fn spawn_health_reporter(self: &Arc<Self>) {
        let daemon = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_REPORT_INTERVAL);
            loop {
                interval.tick().await;
                daemon.report_health();
            }
        });
        self.push_task(handle);
    }

    fn report_health(&self) {
        let conn = self.connection.status();
        let upstream_status = match conn.state {
            ConnectionState::Subscribed => DependencyStatus::Healthy,
            ConnectionState::Disconnected => DependencyStatus::Unhealthy,
            ConnectionState::Connecting | ConnectionState::Authenticated | ConnectionState::Backoff => {
                DependencyStatus::Degraded
            }
        };
        self.health
            .report("upstream_channel", Criticality::Critical, upstream_status, conn.last_error.clone());

        let cb = self.writer.circuit_breaker_status();
        let writer_status = if !self.writer.is_connected() {
            DependencyStatus::Unhealthy
        } else {
            match cb.state {
                CircuitState::Closed => DependencyStatus::Healthy,
                CircuitState::HalfOpen => DependencyStatus::Degraded,
                CircuitState::Open => DependencyStatus::Unhealthy,
            }
        };
        let writer_detail =
            (cb.state != CircuitState::Closed).then(|| format!("{} consecutive write failures", cb.failure_count));
        self.health
            .report("database_writer", Criticality::Critical, writer_status, writer_detail);

        let now_secs = self.started_at.elapsed().as_secs() as i64;
        let last_event_secs = self.last_event_secs.load(Ordering::Relaxed);
        let gap = self.settings.observability.quiet_subscription_gap;
        let (event_rate_status, event_rate_detail) = if last_event_secs == NO_EVENT_YET {
            (DependencyStatus::Healthy, None)
        } else {
            let quiet_for = (now_secs - last_event_secs).max(0) as u64;
            if quiet_for > gap.as_secs() {
                (DependencyStatus::Degraded, Some(format!("no events received in {quiet_for}s")))
            } else {
                (DependencyStatus::Healthy, None)
            }
        };
        self.health
            .report("event_rate", Criticality::NonCritical, event_rate_status, event_rate_detail);

        let stats = self.pipeline.stats();
        let queue_capacity = self.settings.pipeline.queue_capacity.max(1);
        let queue_ratio = stats.queue_depth as f64 / queue_capacity as f64;
        let queue_status = if queue_ratio >= 1.0 {
            DependencyStatus::Unhealthy
        } else if queue_ratio >= 0.8 {
            DependencyStatus::Degraded
        } else {
            DependencyStatus::Healthy
        };
        let queue_detail = (queue_status != DependencyStatus::Healthy)
            .then(|| format!("{} of {} slots in use", stats.queue_depth, queue_capacity));
        self.health
            .report("pipeline_queue", Criticality::NonCritical, queue_status, queue_detail);
    }

    /// Runs until a shutdown signal arrives, then sequences teardown and
    /// returns. Binds the health and metrics listeners alongside the event
    /// forwarding loop so a listener bind failure also ends the process.
    pub async fn run(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut event_rx = self
            .connection
            .take_event_stream()
            .await
            .expect("event stream consumed exactly once by the daemon");

        let pipeline = self.pipeline.clone();
        let daemon = self.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                daemon
                    .last_event_secs
                    .store(daemon.started_at.elapsed().as_secs() as i64, Ordering::Relaxed);
                match pipeline.submit(event) {
                    SubmitOutcome::Queued => {}
                    SubmitOutcome::DroppedOverflow => warn!("pipeline queue full, event dropped"),
                    SubmitOutcome::RateLimited => warn!("submission rate limit exceeded, event dropped"),
                }
            }
        });
        self.push_task(forward);

        self.connection.start().await;
        info!("daemon started");

        let health_server = http::serve_health(
            self.settings.observability.health_bind_addr.clone(),
            self.health.clone(),
            self.connection.clone(),
            self.pipeline.clone(),
        );
        let metrics_server = http::serve_metrics(self.settings.observability.metrics_bind_addr.clone(), self.metrics.clone());

        let result = tokio::select! {
            result = health_server => result,
            result = metrics_server => result,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                Ok(())
            }
        };

        self.shutdown().await;
        result
    }

    /// §5 shutdown order: stop intake first, drain the pipeline next so no
    /// point is lost mid-flight, then disconnect the writer (which performs
    /// one last flush), then stop the alert engine's sweep task.
    async fn shutdown(&self) {
        info!("shutting down");
        self.connection.stop().await;
        self.pipeline.stop().await;
        if let Err(error) = self.writer.disconnect().await {
            warn!(%error, "error while disconnecting writer");
        }
        self.alerts.stop();

        for task in self.tasks.lock().expect("task list poisoned").drain(..) {
            task.abort();
        }
    }
}
