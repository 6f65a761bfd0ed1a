pub mod attribute;
pub mod custom;
pub mod domain;
pub mod entity;
pub mod time;

use hearth_model::{Event, FilterResult};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::Instant;
use tracing::error;

/// §4.2 filter kinds share this contract: a predicate, a default-identity
/// transform hook, and a stable cache key so the chain can memoize
/// `should_process` per event fingerprint.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;
    fn should_process(&self, event: &Event) -> bool;

    fn transform(&self, event: Event) -> Event {
        event
    }

    fn cache_key(&self, event: &Event) -> u64 {
        crate::dedup::fingerprint(event)
    }
}

struct FilterEntry {
    filter: Box<dyn Filter>,
    result_cache: Mutex<LruCache<u64, bool>>,
}

/// Ordered filter chain (§4.2 step 2). Registration order is evaluation
/// order; the first `should_process = false` short-circuits the chain.
pub struct FilterChain {
    entries: Vec<FilterEntry>,
    cache_capacity: NonZeroUsize,
}

impl FilterChain {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cache_capacity: NonZeroUsize::new(cache_capacity.max(1)).unwrap(),
        }
    }

    pub fn register(&mut self, filter: Box<dyn Filter>) {
        self.entries.push(FilterEntry {
            filter,
            result_cache: Mutex::new(LruCache::new(self.cache_capacity)),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the chain. Returns the per-filter results (for `stats()`/cache
    /// hit metrics) plus the final event: `None` if the chain dropped it,
    /// `Some(event)` — possibly transformed — otherwise.
    pub fn evaluate(&self, mut event: Event) -> (Vec<FilterResult>, Option<Event>) {
        let mut results = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let started = Instant::now();
            let key = entry.filter.cache_key(&event);

            enum Outcome {
                Cached(bool),
                Fresh(bool),
                Panicked(String),
            }

            let outcome = {
                let mut cache = entry.result_cache.lock().expect("filter cache mutex poisoned");
                match cache.get(&key) {
                    Some(cached) => Outcome::Cached(*cached),
                    None => match catch_unwind(AssertUnwindSafe(|| entry.filter.should_process(&event))) {
                        Ok(decision) => {
                            cache.put(key, decision);
                            Outcome::Fresh(decision)
                        }
                        // A panicking predicate must not poison the cache with
                        // a fabricated decision; the next call re-evaluates it.
                        Err(payload) => Outcome::Panicked(crate::error::panic_message(&*payload)),
                    },
                }
            };

            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            let (should_process, cache_hit) = match outcome {
                Outcome::Cached(decision) => (decision, true),
                Outcome::Fresh(decision) => (decision, false),
                Outcome::Panicked(message) => {
                    let error = crate::error::PipelineError::FilterPanicked {
                        filter: entry.filter.name().to_string(),
                        message,
                    };
                    error!(%error, "filter predicate panicked, passing event through");
                    results.push(FilterResult::panicked(entry.filter.name(), elapsed_ms));
                    event = entry.filter.transform(event);
                    continue;
                }
            };

            if !should_process {
                results.push(FilterResult::drop(entry.filter.name(), elapsed_ms, cache_hit));
                return (results, None);
            }

            results.push(FilterResult::pass(entry.filter.name(), elapsed_ms, cache_hit));
            event = entry.filter.transform(event);
        }

        (results, Some(event))
    }

    pub fn cache_hit_rate(&self, filter_name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.filter.name() == filter_name)
            .map(|e| {
                let cache = e.result_cache.lock().expect("filter cache mutex poisoned");
                if cache.is_empty() {
                    0.0
                } else {
                    // Cache occupancy is the nearest proxy to hit rate we can
                    // read without threading extra counters through every
                    // predicate call; exact hit/miss counts are tracked by
                    // the pipeline's stats collector instead.
                    cache.len() as f64 / cache.cap().get() as f64
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_model::Event;

    struct AlwaysDrop;
    impl Filter for AlwaysDrop {
        fn name(&self) -> &str {
            "always_drop"
        }
        fn should_process(&self, _event: &Event) -> bool {
            false
        }
    }

    struct UppercaseDomain;
    impl Filter for UppercaseDomain {
        fn name(&self) -> &str {
            "uppercase_domain"
        }
        fn should_process(&self, _event: &Event) -> bool {
            true
        }
        fn transform(&self, event: Event) -> Event {
            Event {
                domain: event.domain.to_uppercase(),
                ..event
            }
        }
    }

    #[test]
    fn short_circuits_on_first_false() {
        let mut chain = FilterChain::new(16);
        chain.register(Box::new(AlwaysDrop));
        chain.register(Box::new(UppercaseDomain));

        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        let (results, outcome) = chain.evaluate(event);

        assert_eq!(results.len(), 1);
        assert!(!results[0].should_process);
        assert!(outcome.is_none());
    }

    #[test]
    fn applies_transform_for_passing_filters() {
        let mut chain = FilterChain::new(16);
        chain.register(Box::new(UppercaseDomain));

        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        let (results, outcome) = chain.evaluate(event);

        assert!(results[0].should_process);
        assert_eq!(outcome.unwrap().domain, "LIGHT");
    }

    struct PanickingPredicate;
    impl Filter for PanickingPredicate {
        fn name(&self) -> &str {
            "panicking_predicate"
        }
        fn should_process(&self, _event: &Event) -> bool {
            panic!("boom");
        }
    }

    #[test]
    fn panicking_predicate_passes_the_event_through() {
        let mut chain = FilterChain::new(16);
        chain.register(Box::new(PanickingPredicate));
        chain.register(Box::new(UppercaseDomain));

        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        let (results, outcome) = chain.evaluate(event);

        assert!(results[0].panicked);
        assert!(results[0].should_process);
        assert_eq!(outcome.unwrap().domain, "LIGHT");
    }

    #[test]
    fn panicking_predicate_is_never_cached() {
        let mut chain = FilterChain::new(16);
        chain.register(Box::new(PanickingPredicate));

        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        let (first, _) = chain.evaluate(event.clone());
        let (second, _) = chain.evaluate(event);

        assert!(!first[0].cache_hit);
        assert!(!second[0].cache_hit);
    }

    #[test]
    fn repeated_event_hits_the_filter_cache() {
        let mut chain = FilterChain::new(16);
        chain.register(Box::new(UppercaseDomain));

        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "on");
        let (first, _) = chain.evaluate(event.clone());
        let (second, _) = chain.evaluate(event);

        assert!(!first[0].cache_hit);
        assert!(second[0].cache_hit);
    }
}
