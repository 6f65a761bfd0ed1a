use crate::instance::AlertInstance;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Groups alerts sharing `(rule_name, severity)` within a sliding window to
/// reduce notification noise (§4.4 "Aggregation").
pub struct AlertAggregator {
    window: Duration,
    groups: HashMap<String, Vec<AlertInstance>>,
    last_cleanup: DateTime<Utc>,
}

impl AlertAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            groups: HashMap::new(),
            last_cleanup: Utc::now(),
        }
    }

    fn group_key(alert: &AlertInstance) -> String {
        format!("{}:{}", alert.rule_name, alert.severity.as_str())
    }

    /// Adds a triggered alert to its group, then opportunistically prunes
    /// groups with nothing recent (§4.4 "Empty groups are pruned after an
    /// hour").
    pub fn add_alert(&mut self, alert: AlertInstance) {
        self.groups.entry(Self::group_key(&alert)).or_default().push(alert);

        if Utc::now() - self.last_cleanup > ChronoDuration::minutes(10) {
            self.cleanup_old_groups();
        }
    }

    /// Returns one representative per group that has a member inside the
    /// aggregation window: the highest-severity alert, ties broken by
    /// earliest `triggered_at`.
    pub fn aggregated(&self) -> Vec<AlertInstance> {
        let cutoff = Utc::now() - ChronoDuration::from_std(self.window).unwrap_or(ChronoDuration::zero());
        let mut out = Vec::new();

        for alerts in self.groups.values() {
            let mut recent: Vec<&AlertInstance> = alerts.iter().filter(|a| a.triggered_at >= cutoff).collect();
            if recent.is_empty() {
                continue;
            }

            // Highest severity first; among ties, earliest trigger first.
            recent.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.triggered_at.cmp(&b.triggered_at)));
            out.push(recent[0].clone());
        }

        out
    }

    fn cleanup_old_groups(&mut self) {
        let cutoff = Utc::now() - ChronoDuration::hours(1);
        self.groups.retain(|_, alerts| alerts.iter().any(|a| a.triggered_at >= cutoff));
        self.last_cleanup = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertStatus, Severity};
    use std::collections::BTreeMap;

    fn alert(rule_name: &str, severity: Severity, triggered_at: DateTime<Utc>) -> AlertInstance {
        AlertInstance {
            rule_name: rule_name.to_string(),
            severity,
            status: AlertStatus::Active,
            message: "test".to_string(),
            triggered_at,
            acknowledged_at: None,
            resolved_at: None,
            expires_at: None,
            context: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn groups_fires_into_single_representative_with_earliest_trigger() {
        let mut aggregator = AlertAggregator::new(Duration::from_secs(300));
        let base = Utc::now() - ChronoDuration::minutes(3);

        for i in 0..4 {
            aggregator.add_alert(alert("hot_kitchen", Severity::Warning, base + ChronoDuration::seconds(i * 20)));
        }

        let aggregated = aggregator.aggregated();
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].triggered_at, base);
    }

    #[test]
    fn distinct_rules_are_not_aggregated_together() {
        let mut aggregator = AlertAggregator::new(Duration::from_secs(300));
        aggregator.add_alert(alert("rule_a", Severity::Warning, Utc::now()));
        aggregator.add_alert(alert("rule_b", Severity::Warning, Utc::now()));

        assert_eq!(aggregator.aggregated().len(), 2);
    }
}
