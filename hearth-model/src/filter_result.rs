use crate::event::Event;

/// Outcome of running one filter over one event (§3). The chain short-
/// circuits on the first `should_process = false`.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub should_process: bool,
    pub transformed_event: Option<Event>,
    pub filter_name: String,
    pub processing_time_ms: f64,
    pub cache_hit: bool,
    /// Set when the filter's `should_process` panicked and the dispatcher
    /// treated the event as passed through instead (§7 "Programmer" errors).
    pub panicked: bool,
}

impl FilterResult {
    pub fn pass(filter_name: impl Into<String>, processing_time_ms: f64, cache_hit: bool) -> Self {
        Self {
            should_process: true,
            transformed_event: None,
            filter_name: filter_name.into(),
            processing_time_ms,
            cache_hit,
            panicked: false,
        }
    }

    pub fn drop(filter_name: impl Into<String>, processing_time_ms: f64, cache_hit: bool) -> Self {
        Self {
            should_process: false,
            transformed_event: None,
            filter_name: filter_name.into(),
            processing_time_ms,
            cache_hit,
            panicked: false,
        }
    }

    /// A filter whose `should_process` panicked. Treated as pass-through
    /// rather than dropped, never cached (a caught panic must not become a
    /// cached "false" or "true" for this event's cache key).
    pub fn panicked(filter_name: impl Into<String>, processing_time_ms: f64) -> Self {
        Self {
            should_process: true,
            transformed_event: None,
            filter_name: filter_name.into(),
            processing_time_ms,
            cache_hit: false,
            panicked: true,
        }
    }
}
