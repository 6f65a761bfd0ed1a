use dashmap::DashMap;
use hearth_model::Event;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// An event's identity is event-type + entity-id + a digest of its
/// attribute payload (§4.2 step 1) — explicitly not the timestamp, so a
/// redelivered frame with a fresh `time_fired` still dedups.
pub fn fingerprint(event: &Event) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    event.event_type.hash(&mut hasher);
    event.entity_id.hash(&mut hasher);
    // BTreeMap iteration is key-ordered, so the digest is stable regardless
    // of attribute insertion order.
    for (key, value) in &event.attributes {
        key.hash(&mut hasher);
        format!("{value:?}").hash(&mut hasher);
    }
    hasher.finish()
}

/// Sliding window of recently-seen fingerprints (default 5s / 10,000
/// entries). Eviction is opportunistic: it runs on every insert rather
/// than on a timer, so the hot path never blocks on a background sweep.
pub struct DedupWindow {
    window: Duration,
    capacity: usize,
    seen: DashMap<u64, Instant>,
    order: Mutex<VecDeque<u64>>,
}

impl DedupWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            seen: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns `true` if this is the first time the fingerprint has been
    /// seen within the window (i.e. the event should proceed); `false` if
    /// it's a duplicate.
    pub fn check_and_insert(&self, fingerprint: u64) -> bool {
        self.evict_expired();

        if self.seen.contains_key(&fingerprint) {
            return false;
        }

        self.seen.insert(fingerprint, Instant::now());
        self.order.lock().expect("dedup order mutex poisoned").push_back(fingerprint);
        self.evict_over_capacity();
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_expired(&self) {
        let mut order = self.order.lock().expect("dedup order mutex poisoned");
        while let Some(&oldest) = order.front() {
            match self.seen.get(&oldest) {
                Some(inserted_at) if inserted_at.elapsed() > self.window => {
                    drop(inserted_at);
                    self.seen.remove(&oldest);
                    order.pop_front();
                }
                Some(_) => break,
                None => {
                    order.pop_front();
                }
            }
        }
    }

    fn evict_over_capacity(&self) {
        let mut order = self.order.lock().expect("dedup order mutex poisoned");
        while self.seen.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_model::Event;

    #[test]
    fn same_event_within_window_is_a_duplicate() {
        let window = DedupWindow::new(Duration::from_secs(5), 100);
        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "on");
        let fp = fingerprint(&event);

        assert!(window.check_and_insert(fp));
        assert!(!window.check_and_insert(fp));
    }

    #[test]
    fn different_payload_is_not_a_duplicate() {
        let window = DedupWindow::new(Duration::from_secs(5), 100);
        let on = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "on");
        let off = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "off");

        assert!(window.check_and_insert(fingerprint(&on)));
        assert!(window.check_and_insert(fingerprint(&off)));
    }

    #[test]
    fn timestamp_does_not_affect_identity() {
        let a = Event::new("light", "light.kitchen", "state_changed", 1).with_attribute("state", "on");
        let b = Event::new("light", "light.kitchen", "state_changed", 2).with_attribute("state", "on");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn entry_expires_after_window_elapses() {
        let window = DedupWindow::new(Duration::from_millis(10), 100);
        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        let fp = fingerprint(&event);

        assert!(window.check_and_insert(fp));
        std::thread::sleep(Duration::from_millis(20));
        assert!(window.check_and_insert(fp));
    }

    #[test]
    fn capacity_evicts_oldest_entries() {
        let window = DedupWindow::new(Duration::from_secs(60), 2);
        for i in 0..3 {
            let event = Event::new("light", format!("light.l{i}"), "state_changed", 0);
            window.check_and_insert(fingerprint(&event));
        }
        assert_eq!(window.len(), 2);
    }
}
