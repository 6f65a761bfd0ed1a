use crate::aggregator::AlertAggregator;
use crate::instance::AlertInstance;
use crate::notification::{NotificationMessage, NotificationSink, SinkStats, SinkStatsSnapshot};
use crate::rule::AlertRule;
use crate::threshold::ThresholdEngine;
use crate::types::AlertStatus;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use hearth_config::AlertSettings;
use hearth_model::Event;
use hearth_observability::{labels, names, MetricsRegistry};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertEngineStats {
    pub total_rules: usize,
    pub active_alerts: usize,
    pub history_size: usize,
    pub total_triggered: u64,
    pub total_notifications_sent: u64,
}

/// Evaluates every rule against each event, raises alert instances subject
/// to cooldowns, sweeps expirations, and fans aggregated alerts out to
/// notification sinks (§4.4).
pub struct AlertEngine {
    rules: RwLock<HashMap<String, AlertRule>>,
    active_alerts: Mutex<HashMap<String, AlertInstance>>,
    last_triggered: Mutex<HashMap<String, DateTime<Utc>>>,
    history: Mutex<VecDeque<AlertInstance>>,
    history_capacity: usize,
    threshold_engine: ThresholdEngine,
    aggregator: Mutex<AlertAggregator>,
    sinks: DashMap<String, Arc<dyn NotificationSink>>,
    sink_stats: DashMap<String, SinkStats>,
    min_data_points: usize,
    metrics: Arc<MetricsRegistry>,
    total_triggered: AtomicU64,
    total_notifications_sent: AtomicU64,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl AlertEngine {
    /// Builds the engine and immediately spawns the check-interval sweep
    /// task (§4.4 "Expiry sweep"), matching `Pipeline::new`'s
    /// spawn-on-construction shape.
    pub fn new(settings: &AlertSettings, metrics: Arc<MetricsRegistry>) -> Arc<Self> {
        let engine = Arc::new(Self {
            rules: RwLock::new(HashMap::new()),
            active_alerts: Mutex::new(HashMap::new()),
            last_triggered: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_capacity: settings.history_capacity,
            threshold_engine: ThresholdEngine::new(settings.series_retention, settings.series_max_samples),
            aggregator: Mutex::new(AlertAggregator::new(settings.aggregation_window)),
            sinks: DashMap::new(),
            sink_stats: DashMap::new(),
            min_data_points: settings.min_data_points,
            metrics,
            total_triggered: AtomicU64::new(0),
            total_notifications_sent: AtomicU64::new(0),
            sweep_task: Mutex::new(None),
        });

        let sweep_engine = Arc::clone(&engine);
        let check_interval = settings.check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            loop {
                ticker.tick().await;
                sweep_engine.sweep().await;
            }
        });
        *engine.sweep_task.lock().expect("sweep task mutex poisoned") = Some(handle);

        engine
    }

    pub fn register_rule(&self, rule: AlertRule) {
        self.rules.write().expect("rules lock poisoned").insert(rule.name.clone(), rule);
    }

    pub fn remove_rule(&self, rule_name: &str) -> bool {
        self.rules.write().expect("rules lock poisoned").remove(rule_name).is_some()
    }

    pub fn register_sink(&self, sink: Arc<dyn NotificationSink>) {
        self.sink_stats.insert(sink.id().to_string(), SinkStats::default());
        self.sinks.insert(sink.id().to_string(), sink);
    }

    /// Extracts numeric attributes and evaluates every enabled rule
    /// (§4.4 "Rule evaluation", "Data-point ingestion for thresholds").
    pub fn check_event(&self, event: &Event) -> Vec<AlertInstance> {
        let now = Utc::now();
        for (field_path, value) in event.numeric_attributes() {
            self.threshold_engine.add_data_point(field_path, value, now);
        }

        let mut triggered = Vec::new();
        let rules = self.rules.read().expect("rules lock poisoned");

        for rule in rules.values() {
            if !rule.enabled || !rule.predicates_match(event) {
                continue;
            }

            if let Some(threshold) = &rule.threshold {
                let current_value = match event.resolve_path(&threshold.field_path).and_then(|v| v.as_f64()) {
                    Some(v) => v,
                    None => continue,
                };
                if !self.threshold_engine.evaluate(threshold, current_value, rule.time_window, self.min_data_points) {
                    continue;
                }
            }

            if !self.cooldown_elapsed(&rule.name, rule.cooldown, now) {
                continue;
            }

            let alert = Self::create_alert_instance(rule, event, now);

            self.active_alerts
                .lock()
                .expect("active alerts lock poisoned")
                .insert(rule.name.clone(), alert.clone());
            self.last_triggered.lock().expect("last-triggered lock poisoned").insert(rule.name.clone(), now);
            self.push_history(alert.clone());
            self.aggregator.lock().expect("aggregator lock poisoned").add_alert(alert.clone());

            self.metrics.incr_counter(names::ALERTS_TRIGGERED, labels(&[("severity", rule.severity.as_str())]), 1);
            self.total_triggered.fetch_add(1, Ordering::Relaxed);
            info!(rule = %rule.name, severity = rule.severity.as_str(), "alert triggered");
            triggered.push(alert);
        }

        triggered
    }

    fn cooldown_elapsed(&self, rule_name: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let last_triggered = self.last_triggered.lock().expect("last-triggered lock poisoned");
        match last_triggered.get(rule_name) {
            None => true,
            Some(last) => now - *last >= ChronoDuration::from_std(cooldown).unwrap_or(ChronoDuration::zero()),
        }
    }

    fn create_alert_instance(rule: &AlertRule, event: &Event, now: DateTime<Utc>) -> AlertInstance {
        let mut message = format!("Alert '{}' triggered: {}", rule.name, rule.description);
        if let Some(threshold) = &rule.threshold {
            message.push_str(&format!(" (threshold: {:?} {})", threshold.kind, threshold.value));
        }

        let mut context = BTreeMap::new();
        context.insert("domain".to_string(), event.domain.clone());
        context.insert("entity_id".to_string(), event.entity_id.clone());
        context.insert("event_type".to_string(), event.event_type.clone());

        AlertInstance {
            rule_name: rule.name.clone(),
            severity: rule.severity,
            status: AlertStatus::Active,
            message,
            triggered_at: now,
            acknowledged_at: None,
            resolved_at: None,
            expires_at: Some(now + ChronoDuration::from_std(rule.time_window).unwrap_or(ChronoDuration::zero())),
            context,
            tags: rule.tags.clone(),
        }
    }

    fn push_history(&self, alert: AlertInstance) {
        let mut history = self.history.lock().expect("history lock poisoned");
        history.push_back(alert);
        while history.len() > self.history_capacity {
            history.pop_front();
        }
    }

    /// Serialized against `check_event`'s insert/remove via the same
    /// `active_alerts` lock (§5 "Alert acknowledge/resolve are serialized
    /// against the check-interval sweep").
    pub fn acknowledge(&self, rule_name: &str) -> bool {
        let mut active = self.active_alerts.lock().expect("active alerts lock poisoned");
        match active.get_mut(rule_name) {
            Some(alert) if alert.status == AlertStatus::Active => {
                alert.acknowledge();
                true
            }
            _ => false,
        }
    }

    pub fn resolve(&self, rule_name: &str) -> bool {
        let mut active = self.active_alerts.lock().expect("active alerts lock poisoned");
        match active.remove(rule_name) {
            Some(mut alert) => {
                alert.resolve();
                drop(active);
                self.push_history(alert);
                true
            }
            None => false,
        }
    }

    pub fn active_alerts(&self) -> Vec<AlertInstance> {
        self.active_alerts.lock().expect("active alerts lock poisoned").values().cloned().collect()
    }

    pub fn history(&self, limit: usize) -> Vec<AlertInstance> {
        let history = self.history.lock().expect("history lock poisoned");
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn sink_stats(&self, sink_id: &str) -> Option<SinkStatsSnapshot> {
        self.sink_stats.get(sink_id).map(|s| s.snapshot())
    }

    pub fn stats(&self) -> AlertEngineStats {
        AlertEngineStats {
            total_rules: self.rules.read().expect("rules lock poisoned").len(),
            active_alerts: self.active_alerts.lock().expect("active alerts lock poisoned").len(),
            history_size: self.history.lock().expect("history lock poisoned").len(),
            total_triggered: self.total_triggered.load(Ordering::Relaxed),
            total_notifications_sent: self.total_notifications_sent.load(Ordering::Relaxed),
        }
    }

    /// One check-interval tick (§4.4 "Expiry sweep"): expire, trim, then
    /// fan aggregated alerts out to notification sinks.
    async fn sweep(&self) {
        self.expire_active_alerts();

        let aggregated = self.aggregator.lock().expect("aggregator lock poisoned").aggregated();
        for alert in aggregated {
            self.dispatch_notifications(&alert).await;
        }
    }

    fn expire_active_alerts(&self) {
        let now = Utc::now();
        let expired: Vec<AlertInstance> = {
            let mut active = self.active_alerts.lock().expect("active alerts lock poisoned");
            let expired_names: Vec<String> =
                active.iter().filter(|(_, alert)| alert.is_expired(now)).map(|(name, _)| name.clone()).collect();

            expired_names
                .into_iter()
                .filter_map(|name| {
                    active.remove(&name).map(|mut alert| {
                        alert.status = AlertStatus::Expired;
                        alert
                    })
                })
                .collect()
        };

        for alert in expired {
            self.push_history(alert);
        }
    }

    async fn dispatch_notifications(&self, alert: &AlertInstance) {
        let sink_ids: Vec<String> = {
            let rules = self.rules.read().expect("rules lock poisoned");
            match rules.get(&alert.rule_name) {
                Some(rule) => rule.notification_sinks.clone(),
                None => Vec::new(),
            }
        };

        for sink_id in sink_ids {
            let Some(sink) = self.sinks.get(&sink_id).map(|s| Arc::clone(&s)) else {
                continue;
            };
            let message = NotificationMessage::for_alert(alert, sink_id.clone());
            let success = sink.send(&message).await;

            if let Some(stats) = self.sink_stats.get(&sink_id) {
                stats.record(success);
            }
            if success {
                self.total_notifications_sent.fetch_add(1, Ordering::Relaxed);
                self.metrics.incr_counter(names::ALERTS_NOTIFICATIONS_SENT, labels(&[("sink", &sink_id)]), 1);
            }
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.sweep_task.lock().expect("sweep task mutex poisoned").take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::LoggingSink;
    use crate::rule::{Predicate, PredicateOp, Threshold, ThresholdType};
    use crate::types::Severity;

    fn settings() -> AlertSettings {
        AlertSettings {
            check_interval: Duration::from_millis(20),
            aggregation_window: Duration::from_secs(300),
            history_capacity: 100,
            min_data_points: 3,
            series_retention: Duration::from_secs(86_400),
            series_max_samples: 10_000,
        }
    }

    #[tokio::test]
    async fn predicate_only_rule_triggers_once_then_respects_cooldown() {
        let engine = AlertEngine::new(&settings(), Arc::new(MetricsRegistry::new()));
        let rule = AlertRule::new("bright_kitchen", "brightness spike", Severity::Warning)
            .with_predicate(Predicate::new("brightness", PredicateOp::Gt(150.0)))
            .with_cooldown(Duration::from_secs(900));
        engine.register_rule(rule);

        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 200_i64);

        let first = engine.check_event(&event);
        let second = engine.check_event(&event);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        engine.stop();
    }

    #[tokio::test]
    async fn threshold_rule_requires_min_data_points() {
        let engine = AlertEngine::new(&settings(), Arc::new(MetricsRegistry::new()));
        let rule = AlertRule::new("hot_sensor", "temperature outlier", Severity::Critical)
            .with_threshold(Threshold::new("temperature", ThresholdType::Above, 30.0));
        engine.register_rule(rule);

        let hot = |v: f64| Event::new("climate", "climate.den", "state_changed", 0).with_attribute("temperature", v);

        assert!(engine.check_event(&hot(35.0)).is_empty());
        assert!(engine.check_event(&hot(36.0)).is_empty());
        assert_eq!(engine.check_event(&hot(40.0)).len(), 1);
        engine.stop();
    }

    #[tokio::test]
    async fn acknowledge_and_resolve_require_an_active_alert() {
        let engine = AlertEngine::new(&settings(), Arc::new(MetricsRegistry::new()));
        assert!(!engine.acknowledge("missing"));
        assert!(!engine.resolve("missing"));

        let rule = AlertRule::new("bright_kitchen", "brightness spike", Severity::Warning)
            .with_predicate(Predicate::new("brightness", PredicateOp::Gt(150.0)));
        engine.register_rule(rule);
        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 200_i64);
        engine.check_event(&event);

        assert!(engine.acknowledge("bright_kitchen"));
        assert!(engine.resolve("bright_kitchen"));
        assert!(engine.active_alerts().is_empty());
        assert_eq!(engine.history(10).len(), 1);
        engine.stop();
    }

    #[tokio::test]
    async fn sweep_expires_alerts_past_their_time_window() {
        let mut short_settings = settings();
        short_settings.check_interval = Duration::from_millis(10);
        let engine = AlertEngine::new(&short_settings, Arc::new(MetricsRegistry::new()));
        engine.register_sink(Arc::new(LoggingSink::new("log")));

        let rule = AlertRule::new("flash", "short-lived", Severity::Info)
            .with_predicate(Predicate::new("brightness", PredicateOp::Gt(0.0)))
            .with_time_window(Duration::from_millis(5))
            .with_sink("log");
        engine.register_rule(rule);

        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 10_i64);
        engine.check_event(&event);
        assert_eq!(engine.active_alerts().len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(engine.active_alerts().is_empty());
        engine.stop();
    }
}
