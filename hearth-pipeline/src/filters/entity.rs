use super::Filter;
use hearth_model::Event;
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum PatternKind {
    Glob,
    Regex,
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

fn compile(pattern: &str, kind: PatternKind) -> Result<Regex, regex::Error> {
    let regex_source = match kind {
        PatternKind::Glob => glob_to_regex(pattern),
        PatternKind::Regex => pattern.to_string(),
    };
    RegexBuilder::new(&regex_source).case_insensitive(true).build()
}

/// `event.entity_id` matches any of a set of glob or regex patterns,
/// case-insensitive (§4.2). Patterns compile once at construction; a
/// separate hot-path cache remembers the match outcome per literal entity
/// id so repeat traffic from the same entity skips every regex scan.
pub struct EntityFilter {
    name: String,
    patterns: Vec<Regex>,
    hot_cache: Mutex<LruCache<String, bool>>,
}

impl EntityFilter {
    pub fn new(
        name: impl Into<String>,
        patterns: &[(&str, PatternKind)],
        hot_cache_capacity: usize,
    ) -> Result<Self, regex::Error> {
        let compiled = patterns
            .iter()
            .map(|(pattern, kind)| compile(pattern, *kind))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.into(),
            patterns: compiled,
            hot_cache: Mutex::new(LruCache::new(NonZeroUsize::new(hot_cache_capacity.max(1)).unwrap())),
        })
    }

    fn matches(&self, entity_id: &str) -> bool {
        if let Some(hit) = self.hot_cache.lock().expect("entity hot cache mutex poisoned").get(entity_id) {
            return *hit;
        }
        let matched = self.patterns.iter().any(|re| re.is_match(entity_id));
        self.hot_cache
            .lock()
            .expect("entity hot cache mutex poisoned")
            .put(entity_id.to_string(), matched);
        matched
    }
}

impl Filter for EntityFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_process(&self, event: &Event) -> bool {
        self.matches(&event.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_pattern_matches_case_insensitively() {
        let filter = EntityFilter::new("kitchen_lights", &[("light.kitchen*", PatternKind::Glob)], 100).unwrap();
        assert!(filter.should_process(&Event::new("light", "LIGHT.Kitchen_Ceiling", "state_changed", 0)));
        assert!(!filter.should_process(&Event::new("light", "light.bedroom", "state_changed", 0)));
    }

    #[test]
    fn regex_pattern_is_used_verbatim() {
        let filter = EntityFilter::new("numbered_sensors", &[(r"sensor\.temp_\d+", PatternKind::Regex)], 100).unwrap();
        assert!(filter.should_process(&Event::new("sensor", "sensor.temp_12", "state_changed", 0)));
        assert!(!filter.should_process(&Event::new("sensor", "sensor.humidity_12", "state_changed", 0)));
    }

    #[test]
    fn hot_cache_is_consulted_on_repeat_lookups() {
        let filter = EntityFilter::new("kitchen", &[("light.kitchen", PatternKind::Glob)], 100).unwrap();
        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        assert!(filter.should_process(&event));
        assert!(filter.should_process(&event));
        assert_eq!(filter.hot_cache.lock().unwrap().len(), 1);
    }
}
