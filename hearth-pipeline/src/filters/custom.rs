use super::Filter;
use hearth_model::Event;
use std::sync::Arc;

/// User-supplied predicate applied to the whole event. A panic inside
/// `predicate` is caught by `FilterChain::evaluate`, not here, and treated
/// as a pass-through rather than crashing the worker.
pub struct CustomFilter {
    name: String,
    predicate: Arc<dyn Fn(&Event) -> bool + Send + Sync>,
}

impl CustomFilter {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl Filter for CustomFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_process(&self, event: &Event) -> bool {
        (self.predicate)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_arbitrary_predicate() {
        let filter = CustomFilter::new("even_brightness", |event| {
            event
                .attribute("brightness")
                .and_then(|v| v.as_f64())
                .is_some_and(|b| (b as i64) % 2 == 0)
        });

        let even = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 200_i64);
        let odd = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 201_i64);

        assert!(filter.should_process(&even));
        assert!(!filter.should_process(&odd));
    }
}
