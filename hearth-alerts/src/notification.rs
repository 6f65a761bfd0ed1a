use crate::instance::AlertInstance;
use crate::types::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// One message per aggregated alert (§4.4 "Notification fan-out").
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub alert_snapshot: AlertInstance,
    pub sink_id: String,
    pub metadata: BTreeMap<String, String>,
}

impl NotificationMessage {
    pub fn for_alert(alert: &AlertInstance, sink_id: impl Into<String>) -> Self {
        Self {
            title: format!("Alert: {}", alert.rule_name),
            body: alert.message.clone(),
            severity: alert.severity,
            alert_snapshot: alert.clone(),
            sink_id: sink_id.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// A single outbound sink operation (§3 "Non-goals": specific transports —
/// email, webhook, chat, paging — are external collaborators behind this
/// one interface).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn id(&self) -> &str;
    async fn send(&self, message: &NotificationMessage) -> bool;
}

/// Per-sink success/failure counters (§4.4 "Per-sink success/failure counts
/// are tracked").
#[derive(Debug, Default)]
pub struct SinkStats {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_success: Mutex<Option<DateTime<Utc>>>,
    last_failure: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SinkStatsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
}

impl SinkStats {
    pub fn record(&self, success: bool) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
            *self.last_success.lock().expect("sink stats mutex poisoned") = Some(Utc::now());
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            *self.last_failure.lock().expect("sink stats mutex poisoned") = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
        }
    }
}

/// Logs the notification instead of sending it anywhere. Useful as a
/// default sink and in tests that don't want a live HTTP dependency.
pub struct LoggingSink {
    id: String,
}

impl LoggingSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl NotificationSink for LoggingSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: &NotificationMessage) -> bool {
        info!(sink = %self.id, title = %message.title, severity = message.severity.as_str(), "alert notification");
        true
    }
}

/// Generic outbound webhook sink (§4.4, grounded on the original
/// `WebhookNotifier`): POSTs the message as JSON to a configured URL.
pub struct WebhookSink {
    id: String,
    url: String,
    http: reqwest::Client,
    stats: SinkStats,
}

impl WebhookSink {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            http: reqwest::Client::new(),
            stats: SinkStats::default(),
        }
    }

    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: &NotificationMessage) -> bool {
        let payload = serde_json::json!({
            "title": message.title,
            "body": message.body,
            "severity": message.severity.as_str(),
            "rule_name": message.alert_snapshot.rule_name,
            "status": message.alert_snapshot.status.as_str(),
            "triggered_at": message.alert_snapshot.triggered_at.to_rfc3339(),
            "tags": message.alert_snapshot.tags,
            "metadata": message.metadata,
        });

        match self.http.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                self.stats.record(true);
                true
            }
            Ok(response) => {
                warn!(sink = %self.id, status = %response.status(), "webhook notification rejected");
                self.stats.record(false);
                false
            }
            Err(e) => {
                error!(sink = %self.id, error = %e, "webhook notification failed");
                self.stats.record(false);
                false
            }
        }
    }
}
