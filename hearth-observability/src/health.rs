use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DependencyStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    NonCritical,
}

#[derive(Debug, Clone)]
pub struct DependencyReport {
    pub name: &'static str,
    pub status: DependencyStatus,
    pub criticality: Criticality,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub status: DependencyStatus,
    pub uptime: Duration,
    pub dependencies: Vec<DependencyReport>,
}

impl HealthSummary {
    /// §6: `GET /ready` returns 200 iff all critical dependencies are healthy.
    pub fn is_ready(&self) -> bool {
        self.dependencies
            .iter()
            .filter(|d| d.criticality == Criticality::Critical)
            .all(|d| d.status == DependencyStatus::Healthy)
    }
}

struct DependencyEntry {
    status: DependencyStatus,
    criticality: Criticality,
    detail: Option<String>,
}

/// Tracks per-dependency health and derives the overall status per §4.5:
/// unhealthy if any critical dependency is down, degraded if a non-critical
/// one is down or a critical one is merely degraded, else healthy.
#[derive(Debug)]
pub struct HealthRegistry {
    started_at: Instant,
    dependencies: DashMap<&'static str, DependencyEntry>,
}

impl std::fmt::Debug for DependencyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyEntry")
            .field("status", &self.status)
            .field("criticality", &self.criticality)
            .finish()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            dependencies: DashMap::new(),
        }
    }

    pub fn report(
        &self,
        name: &'static str,
        criticality: Criticality,
        status: DependencyStatus,
        detail: Option<String>,
    ) {
        self.dependencies.insert(
            name,
            DependencyEntry {
                status,
                criticality,
                detail,
            },
        );
    }

    pub fn summary(&self) -> HealthSummary {
        let dependencies: Vec<DependencyReport> = self
            .dependencies
            .iter()
            .map(|entry| DependencyReport {
                name: *entry.key(),
                status: entry.value().status,
                criticality: entry.value().criticality,
                detail: entry.value().detail.clone(),
            })
            .collect();

        let any_critical_unhealthy = dependencies
            .iter()
            .any(|d| d.criticality == Criticality::Critical && d.status == DependencyStatus::Unhealthy);
        let any_degraded = dependencies.iter().any(|d| d.status != DependencyStatus::Healthy);

        let status = if any_critical_unhealthy {
            DependencyStatus::Unhealthy
        } else if any_degraded {
            DependencyStatus::Degraded
        } else {
            DependencyStatus::Healthy
        };

        HealthSummary {
            status,
            uptime: self.started_at.elapsed(),
            dependencies,
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_when_no_dependencies_reported() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.summary().status, DependencyStatus::Healthy);
    }

    #[test]
    fn critical_dependency_down_is_unhealthy() {
        let registry = HealthRegistry::new();
        registry.report(
            "database_writer",
            Criticality::Critical,
            DependencyStatus::Unhealthy,
            Some("circuit breaker open".to_string()),
        );
        let summary = registry.summary();
        assert_eq!(summary.status, DependencyStatus::Unhealthy);
        assert!(!summary.is_ready());
    }

    #[test]
    fn non_critical_dependency_down_is_degraded_not_unhealthy() {
        let registry = HealthRegistry::new();
        registry.report("upstream_channel", Criticality::Critical, DependencyStatus::Healthy, None);
        registry.report(
            "event_rate",
            Criticality::NonCritical,
            DependencyStatus::Degraded,
            Some("no events received in 60s".to_string()),
        );
        let summary = registry.summary();
        assert_eq!(summary.status, DependencyStatus::Degraded);
        assert!(summary.is_ready());
    }
}
