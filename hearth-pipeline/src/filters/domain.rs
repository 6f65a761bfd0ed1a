use super::Filter;
use hearth_model::Event;
use std::collections::HashSet;

/// `event.domain ∈ set` (§4.2 filter kinds table).
pub struct DomainFilter {
    name: String,
    domains: HashSet<String>,
}

impl DomainFilter {
    pub fn new(name: impl Into<String>, domains: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            domains: domains.into_iter().collect(),
        }
    }
}

impl Filter for DomainFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_process(&self, event: &Event) -> bool {
        self.domains.contains(&event.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_only_listed_domains() {
        let filter = DomainFilter::new("lights_and_climate", ["light".to_string(), "climate".to_string()]);
        let light = Event::new("light", "light.kitchen", "state_changed", 0);
        let lock = Event::new("lock", "lock.front_door", "state_changed", 0);

        assert!(filter.should_process(&light));
        assert!(!filter.should_process(&lock));
    }
}
