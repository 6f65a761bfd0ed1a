use crate::types::{AlertStatus, Severity};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A triggered rule (§3 "Alert instance"). Mutated only through the
/// engine's `acknowledge`/`resolve` operations or the background expiry
/// sweep; moves from `active_alerts` to `history` on resolve or expire.
#[derive(Debug, Clone)]
pub struct AlertInstance {
    pub rule_name: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub context: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl AlertInstance {
    pub fn acknowledge(&mut self) {
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(Utc::now());
    }

    pub fn resolve(&mut self) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(Utc::now());
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AlertInstance {
        AlertInstance {
            rule_name: "hot_kitchen".to_string(),
            severity: Severity::Warning,
            status: AlertStatus::Active,
            message: "test".to_string(),
            triggered_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            context: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn resolve_sets_status_and_timestamp() {
        let mut alert = sample();
        alert.resolve();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn expires_at_in_the_past_is_expired() {
        let alert = sample();
        assert!(alert.is_expired(Utc::now()));
    }
}
