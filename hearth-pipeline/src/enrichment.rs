use crate::rate_limiter::TokenBucket;
use async_trait::async_trait;
use hearth_model::{Event, Value};
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Pluggable external-data lookup (§4.2 step 4, weather being the
/// canonical example). `key_for` derives the lookup key (e.g. a location
/// string) from an event; events with no derivable key are left alone.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn key_for(&self, event: &Event) -> Option<String>;
    async fn lookup(&self, key: &str) -> Result<BTreeMap<String, Value>, String>;
}

pub struct WeatherEnricher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherEnricher {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Enricher for WeatherEnricher {
    fn key_for(&self, event: &Event) -> Option<String> {
        event.attribute("location").and_then(Value::as_str).map(|s| s.to_string())
    }

    async fn lookup(&self, key: &str) -> Result<BTreeMap<String, Value>, String> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", key), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let body: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        Ok(extract_weather_fields(&body))
    }
}

/// §6 "Enrichment provider": all response fields are optional and degrade
/// gracefully when absent.
fn extract_weather_fields(body: &serde_json::Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    fn lookup_path<'a>(body: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
        let mut cursor = body;
        for segment in path {
            cursor = cursor.get(segment)?;
        }
        Some(cursor)
    }
    let put_f64 = |out: &mut BTreeMap<String, Value>, key: &str, path: &[&str]| {
        if let Some(v) = lookup_path(body, path).and_then(|c| c.as_f64()) {
            out.insert(key.to_string(), Value::Float(v));
        }
    };
    let put_str = |out: &mut BTreeMap<String, Value>, key: &str, path: &[&str]| {
        if let Some(v) = lookup_path(body, path).and_then(|c| c.as_str()) {
            out.insert(key.to_string(), Value::String(v.to_string()));
        }
    };

    put_f64(&mut out, "weather_temp", &["main", "temp"]);
    put_f64(&mut out, "weather_feels_like", &["main", "feels_like"]);
    put_f64(&mut out, "weather_humidity", &["main", "humidity"]);
    put_f64(&mut out, "weather_pressure", &["main", "pressure"]);
    put_str(&mut out, "weather_condition", &["weather", "0", "main"]);
    put_str(&mut out, "weather_description", &["weather", "0", "description"]);
    put_f64(&mut out, "weather_wind_speed", &["wind", "speed"]);
    put_f64(&mut out, "weather_wind_deg", &["wind", "deg"]);
    put_f64(&mut out, "weather_clouds", &["clouds", "all"]);
    put_f64(&mut out, "weather_visibility", &["visibility"]);
    put_str(&mut out, "weather_location_name", &["name"]);
    put_str(&mut out, "weather_country", &["sys", "country"]);
    put_f64(&mut out, "weather_lat", &["coord", "lat"]);
    put_f64(&mut out, "weather_lon", &["coord", "lon"]);

    out
}

struct CacheEntry {
    attributes: BTreeMap<String, Value>,
    inserted_at: Instant,
}

/// TTL-bounded, LRU-capped cache of enrichment results keyed by lookup key
/// (§4.2 step 4: default TTL 5min, default capacity 1,000).
pub struct EnrichmentCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl EnrichmentCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
        }
    }

    pub fn put(&self, key: String, attributes: BTreeMap<String, Value>) {
        self.entries.lock().expect("enrichment cache mutex poisoned").put(
            key,
            CacheEntry {
                attributes,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get_fresh(&self, key: &str) -> Option<BTreeMap<String, Value>> {
        let mut cache = self.entries.lock().expect("enrichment cache mutex poisoned");
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() <= self.ttl {
            Some(entry.attributes.clone())
        } else {
            None
        }
    }

    pub fn get_stale(&self, key: &str) -> Option<BTreeMap<String, Value>> {
        self.entries
            .lock()
            .expect("enrichment cache mutex poisoned")
            .get(key)
            .map(|entry| entry.attributes.clone())
    }
}

/// Runs the enrichment step for one event (§4.2 step 4). `fallback_enabled`
/// controls whether a lookup failure may reuse a stale cached value; when
/// it cannot, the event is tagged with a failure marker and processing
/// continues — enrichment failure never aborts the pipeline.
pub async fn enrich(
    event: Event,
    enricher: &dyn Enricher,
    cache: &EnrichmentCache,
    rate_limiter: &TokenBucket,
    fallback_enabled: bool,
) -> Event {
    let Some(key) = enricher.key_for(&event) else {
        return event;
    };

    if let Some(fresh) = cache.get_fresh(&key) {
        return merge_attributes(event, fresh);
    }

    if !rate_limiter.try_acquire() {
        return match cache.get_stale(&key) {
            Some(stale) if fallback_enabled => merge_attributes(event, stale).with_attribute("enrichment_stale", true),
            _ => event.with_attribute("enrichment_failed", true),
        };
    }

    match enricher.lookup(&key).await {
        Ok(attrs) => {
            cache.put(key, attrs.clone());
            merge_attributes(event, attrs)
        }
        Err(e) => {
            warn!(error = %e, key, "enrichment lookup failed");
            match cache.get_stale(&key) {
                Some(stale) if fallback_enabled => merge_attributes(event, stale).with_attribute("enrichment_stale", true),
                _ => event.with_attribute("enrichment_failed", true),
            }
        }
    }
}

fn merge_attributes(event: Event, attrs: BTreeMap<String, Value>) -> Event {
    let mut merged = event.attributes.clone();
    merged.extend(attrs);
    event.with_attributes(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEnricher {
        response: Result<BTreeMap<String, Value>, String>,
    }

    #[async_trait]
    impl Enricher for FakeEnricher {
        fn key_for(&self, event: &Event) -> Option<String> {
            event.attribute("location").and_then(Value::as_str).map(|s| s.to_string())
        }

        async fn lookup(&self, _key: &str) -> Result<BTreeMap<String, Value>, String> {
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn event_without_location_is_untouched() {
        let enricher = FakeEnricher { response: Ok(BTreeMap::new()) };
        let cache = EnrichmentCache::new(Duration::from_secs(300), 100);
        let limiter = TokenBucket::new(100);
        let event = Event::new("climate", "climate.den", "state_changed", 0);

        let out = enrich(event.clone(), &enricher, &cache, &limiter, true).await;
        assert_eq!(out, event);
    }

    #[tokio::test]
    async fn successful_lookup_merges_attributes_and_populates_cache() {
        let mut response = BTreeMap::new();
        response.insert("weather_temp".to_string(), Value::Float(21.5));
        let enricher = FakeEnricher { response: Ok(response) };
        let cache = EnrichmentCache::new(Duration::from_secs(300), 100);
        let limiter = TokenBucket::new(100);
        let event =
            Event::new("climate", "climate.den", "state_changed", 0).with_attribute("location", "Portland");

        let out = enrich(event, &enricher, &cache, &limiter, true).await;
        assert_eq!(out.attribute("weather_temp"), Some(&Value::Float(21.5)));
        assert!(cache.get_fresh("Portland").is_some());
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_stale_cache_entry() {
        let mut stale = BTreeMap::new();
        stale.insert("weather_temp".to_string(), Value::Float(18.0));
        let cache = EnrichmentCache::new(Duration::from_millis(1), 100);
        cache.put("Portland".to_string(), stale);
        std::thread::sleep(Duration::from_millis(5));

        let enricher = FakeEnricher { response: Err("timeout".to_string()) };
        let limiter = TokenBucket::new(100);
        let event =
            Event::new("climate", "climate.den", "state_changed", 0).with_attribute("location", "Portland");

        let out = enrich(event, &enricher, &cache, &limiter, true).await;
        assert_eq!(out.attribute("weather_temp"), Some(&Value::Float(18.0)));
        assert_eq!(out.attribute("enrichment_stale"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn failed_lookup_without_fallback_is_marked_failed() {
        let cache = EnrichmentCache::new(Duration::from_secs(300), 100);
        let enricher = FakeEnricher { response: Err("timeout".to_string()) };
        let limiter = TokenBucket::new(100);
        let event =
            Event::new("climate", "climate.den", "state_changed", 0).with_attribute("location", "Nowhere");

        let out = enrich(event, &enricher, &cache, &limiter, false).await;
        assert_eq!(out.attribute("enrichment_failed"), Some(&Value::Bool(true)));
    }
}
