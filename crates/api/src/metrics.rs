//! Process-wide metrics collector.
//!
//! Counters are atomic; the label map itself sits behind an `RwLock` taken
//! for writing only when a new label combination first appears. Histograms
//! keep a bounded reservoir (the most recent 1024 observations per label
//! set) behind a mutex. Exported in Prometheus text exposition format at
//! `GET /metrics`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Maximum observations retained per histogram label set.
const RESERVOIR_CAPACITY: usize = 1024;

/// Metric identity: name plus ordered label pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricKey {
    name: &'static str,
    labels: Vec<(&'static str, String)>,
}

impl MetricKey {
    fn new(name: &'static str, labels: &[(&'static str, &str)]) -> Self {
        Self {
            name,
            labels: labels
                .iter()
                .map(|(k, v)| (*k, (*v).to_string()))
                .collect(),
        }
    }

    /// Render as `name{k="v",...}` for the exposition format.
    fn render(&self) -> String {
        if self.labels.is_empty() {
            return self.name.to_string();
        }
        let labels: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect();
        format!("{}{{{}}}", self.name, labels.join(","))
    }
}

/// Bounded sample reservoir plus running totals.
struct Reservoir {
    samples: VecDeque<f64>,
    count: u64,
    sum: f64,
}

impl Reservoir {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(RESERVOIR_CAPACITY),
            count: 0,
            sum: 0.0,
        }
    }

    fn observe(&mut self, value: f64) {
        if self.samples.len() == RESERVOIR_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.count += 1;
        self.sum += value;
    }
}

/// Thread-safe counters, gauges, and histograms.
pub struct MetricsCollector {
    counters: RwLock<HashMap<MetricKey, Arc<AtomicU64>>>,
    gauges: Mutex<HashMap<MetricKey, f64>>,
    histograms: Mutex<HashMap<MetricKey, Reservoir>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    /// Increment a counter by one.
    pub fn increment(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        let key = MetricKey::new(name, labels);
        // Fast path: the counter already exists.
        {
            let counters = self.counters.read().expect("metrics poisoned");
            if let Some(counter) = counters.get(&key) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().expect("metrics poisoned");
        counters
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Set a gauge to a point-in-time value.
    pub fn set_gauge(&self, name: &'static str, labels: &[(&'static str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        self.gauges
            .lock()
            .expect("metrics poisoned")
            .insert(key, value);
    }

    /// Record a histogram observation.
    pub fn observe(&self, name: &'static str, labels: &[(&'static str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        self.histograms
            .lock()
            .expect("metrics poisoned")
            .entry(key)
            .or_insert_with(Reservoir::new)
            .observe(value);
    }

    /// Read back a counter (test and introspection helper).
    pub fn counter_value(&self, name: &'static str, labels: &[(&'static str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters
            .read()
            .expect("metrics poisoned")
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render everything in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut lines = Vec::new();

        let counters = self.counters.read().expect("metrics poisoned");
        let mut counter_entries: Vec<_> = counters
            .iter()
            .map(|(key, value)| (key.clone(), value.load(Ordering::Relaxed)))
            .collect();
        drop(counters);
        counter_entries.sort_by(|a, b| a.0.render().cmp(&b.0.render()));
        let mut last_name = "";
        for (key, value) in &counter_entries {
            if key.name != last_name {
                lines.push(format!("# TYPE {} counter", key.name));
                last_name = key.name;
            }
            lines.push(format!("{} {}", key.render(), value));
        }

        let gauges = self.gauges.lock().expect("metrics poisoned");
        let mut gauge_entries: Vec<_> = gauges
            .iter()
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        drop(gauges);
        gauge_entries.sort_by(|a, b| a.0.render().cmp(&b.0.render()));
        let mut last_name = "";
        for (key, value) in &gauge_entries {
            if key.name != last_name {
                lines.push(format!("# TYPE {} gauge", key.name));
                last_name = key.name;
            }
            lines.push(format!("{} {}", key.render(), value));
        }

        let histograms = self.histograms.lock().expect("metrics poisoned");
        let mut histogram_entries: Vec<_> = histograms
            .iter()
            .map(|(key, r)| (key.clone(), r.count, r.sum))
            .collect();
        drop(histograms);
        histogram_entries.sort_by(|a, b| a.0.render().cmp(&b.0.render()));
        let mut last_name = "";
        for (key, count, sum) in &histogram_entries {
            if key.name != last_name {
                lines.push(format!("# TYPE {} histogram", key.name));
                last_name = key.name;
            }
            let suffix = if key.labels.is_empty() {
                String::new()
            } else {
                key.render()[key.name.len()..].to_string()
            };
            lines.push(format!("{}_count{} {}", key.name, suffix, count));
            lines.push(format!("{}_sum{} {}", key.name, suffix, sum));
        }

        lines.push(String::new());
        lines.join("\n")
    }

    // -----------------------------------------------------------------------
    // Domain metrics
    // -----------------------------------------------------------------------

    pub fn webhook_received(&self, app: &str) {
        self.increment("webhook_received_total", &[("app", app)]);
    }

    pub fn webhook_verification_failed(&self, app: &str) {
        self.increment("webhook_verification_failed_total", &[("app", app)]);
    }

    pub fn webhook_dedup(&self, app: &str) {
        self.increment("webhook_dedup_total", &[("app", app)]);
    }

    pub fn rate_limit_hit(&self, scope: &str) {
        self.increment("rate_limit_hit_total", &[("scope", scope)]);
    }

    pub fn trigger_registration(&self, app: &str, result: &str) {
        self.increment(
            "trigger_registration_total",
            &[("app", app), ("result", result)],
        );
    }

    pub fn trigger_unregister(&self, app: &str, result: &str) {
        self.increment(
            "trigger_unregister_total",
            &[("app", app), ("result", result)],
        );
    }

    pub fn renewal(&self, app: &str, result: &str) {
        self.increment("renewal_total", &[("app", app), ("result", result)]);
    }

    pub fn observe_processing_duration(&self, app: &str, seconds: f64) {
        self.observe(
            "webhook_processing_duration_seconds",
            &[("app", app)],
            seconds,
        );
    }

    pub fn set_active_triggers(&self, count: i64) {
        self.set_gauge("active_triggers_count", &[], count as f64);
    }

    pub fn set_pending_events(&self, count: i64) {
        self.set_gauge("pending_events_count", &[], count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label_set() {
        let metrics = MetricsCollector::new();
        metrics.webhook_received("GITHUB");
        metrics.webhook_received("GITHUB");
        metrics.webhook_received("SLACK");

        assert_eq!(
            metrics.counter_value("webhook_received_total", &[("app", "GITHUB")]),
            2
        );
        assert_eq!(
            metrics.counter_value("webhook_received_total", &[("app", "SLACK")]),
            1
        );
        assert_eq!(
            metrics.counter_value("webhook_received_total", &[("app", "GMAIL")]),
            0
        );
    }

    #[test]
    fn histogram_reservoir_is_bounded() {
        let metrics = MetricsCollector::new();
        for i in 0..2000 {
            metrics.observe_processing_duration("GITHUB", i as f64);
        }
        let histograms = metrics.histograms.lock().unwrap();
        let reservoir = histograms.values().next().unwrap();
        assert_eq!(reservoir.samples.len(), RESERVOIR_CAPACITY);
        assert_eq!(reservoir.count, 2000);
    }

    #[test]
    fn prometheus_export_renders_all_kinds() {
        let metrics = MetricsCollector::new();
        metrics.webhook_received("GITHUB");
        metrics.set_active_triggers(7);
        metrics.observe_processing_duration("GITHUB", 0.25);

        let text = metrics.export_prometheus();
        assert!(text.contains("# TYPE webhook_received_total counter"));
        assert!(text.contains("webhook_received_total{app=\"GITHUB\"} 1"));
        assert!(text.contains("# TYPE active_triggers_count gauge"));
        assert!(text.contains("active_triggers_count 7"));
        assert!(text.contains("webhook_processing_duration_seconds_count{app=\"GITHUB\"} 1"));
        assert!(text.contains("webhook_processing_duration_seconds_sum{app=\"GITHUB\"} 0.25"));
    }

    #[test]
    fn gauges_overwrite_previous_values() {
        let metrics = MetricsCollector::new();
        metrics.set_pending_events(10);
        metrics.set_pending_events(3);
        let text = metrics.export_prometheus();
        assert!(text.contains("pending_events_count 3"));
        assert!(!text.contains("pending_events_count 10"));
    }
}
