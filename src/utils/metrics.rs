use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Workflow metrics collector.
///
/// Tracks translation availability, pipeline runs, recovery trips/resets, and
/// run latency. Thread-safe and shared across the application.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Translation gateway
    translation_calls_total: AtomicUsize,
    translation_unavailable: AtomicUsize,

    // Pipeline
    pipeline_runs_total: AtomicUsize,
    pipeline_runs_failed: AtomicUsize,
    pipeline_latency_ms: RwLock<Vec<u64>>,

    // Recovery
    forbidden_trips: AtomicUsize,
    input_rejections: AtomicUsize,
    stale_results_discarded: AtomicUsize,
    page_resets: AtomicUsize,
    app_resets: AtomicUsize,

    // Classifier loader
    classifier_loads: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                translation_calls_total: AtomicUsize::new(0),
                translation_unavailable: AtomicUsize::new(0),
                pipeline_runs_total: AtomicUsize::new(0),
                pipeline_runs_failed: AtomicUsize::new(0),
                pipeline_latency_ms: RwLock::new(Vec::new()),
                forbidden_trips: AtomicUsize::new(0),
                input_rejections: AtomicUsize::new(0),
                stale_results_discarded: AtomicUsize::new(0),
                page_resets: AtomicUsize::new(0),
                app_resets: AtomicUsize::new(0),
                classifier_loads: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_translation(&self, available: bool) {
        self.inner
            .translation_calls_total
            .fetch_add(1, Ordering::Relaxed);
        if !available {
            self.inner
                .translation_unavailable
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_pipeline_run(&self, duration: Duration) {
        self.inner.pipeline_runs_total.fetch_add(1, Ordering::Relaxed);
        self.inner
            .pipeline_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_pipeline_failure(&self) {
        self.inner
            .pipeline_runs_failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forbidden_trip(&self) {
        self.inner.forbidden_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_rejection(&self) {
        self.inner.input_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_discard(&self) {
        self.inner
            .stale_results_discarded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reset(&self, scope: &str) {
        match scope {
            "app" => self.inner.app_resets.fetch_add(1, Ordering::Relaxed),
            _ => self.inner.page_resets.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_classifier_load(&self) {
        self.inner.classifier_loads.fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.pipeline_latency_ms.read();
        let latency_avg = avg(&latency);
        let latency_p50 = percentile(&latency, 0.5);
        let latency_p95 = percentile(&latency, 0.95);
        drop(latency);

        MetricsSnapshot {
            translation_calls_total: self.inner.translation_calls_total.load(Ordering::Relaxed),
            translation_unavailable: self.inner.translation_unavailable.load(Ordering::Relaxed),
            pipeline_runs_total: self.inner.pipeline_runs_total.load(Ordering::Relaxed),
            pipeline_runs_failed: self.inner.pipeline_runs_failed.load(Ordering::Relaxed),
            pipeline_latency_avg_ms: latency_avg,
            pipeline_latency_p50_ms: latency_p50,
            pipeline_latency_p95_ms: latency_p95,
            forbidden_trips: self.inner.forbidden_trips.load(Ordering::Relaxed),
            input_rejections: self.inner.input_rejections.load(Ordering::Relaxed),
            stale_results_discarded: self
                .inner
                .stale_results_discarded
                .load(Ordering::Relaxed),
            page_resets: self.inner.page_resets.load(Ordering::Relaxed),
            app_resets: self.inner.app_resets.load(Ordering::Relaxed),
            classifier_loads: self.inner.classifier_loads.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP translation_calls_total Total translation calls issued
# TYPE translation_calls_total counter
translation_calls_total {}

# HELP translation_unavailable_total Translation calls that fell back to the original text
# TYPE translation_unavailable_total counter
translation_unavailable_total {}

# HELP pipeline_runs_total Classify-and-translate runs started
# TYPE pipeline_runs_total counter
pipeline_runs_total {}

# HELP pipeline_runs_failed_total Runs that failed unexpectedly (degraded to no results)
# TYPE pipeline_runs_failed_total counter
pipeline_runs_failed_total {}

# HELP pipeline_latency_avg_ms Average pipeline run latency in milliseconds
# TYPE pipeline_latency_avg_ms gauge
pipeline_latency_avg_ms {}

# HELP pipeline_latency_p50_ms Median pipeline run latency in milliseconds
# TYPE pipeline_latency_p50_ms gauge
pipeline_latency_p50_ms {}

# HELP pipeline_latency_p95_ms 95th percentile pipeline run latency in milliseconds
# TYPE pipeline_latency_p95_ms gauge
pipeline_latency_p95_ms {}

# HELP forbidden_trips_total Forbidden-word terminal conditions raised
# TYPE forbidden_trips_total counter
forbidden_trips_total {}

# HELP input_rejections_total Unsupported input files rejected
# TYPE input_rejections_total counter
input_rejections_total {}

# HELP stale_results_discarded_total Pipeline completions discarded due to a stale generation
# TYPE stale_results_discarded_total counter
stale_results_discarded_total {}

# HELP resets_total Explicit user resets
# TYPE resets_total counter
resets_total{{scope="page"}} {}
resets_total{{scope="app"}} {}

# HELP classifier_loads_total Classifier load attempts
# TYPE classifier_loads_total counter
classifier_loads_total {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            snapshot.translation_calls_total,
            snapshot.translation_unavailable,
            snapshot.pipeline_runs_total,
            snapshot.pipeline_runs_failed,
            snapshot.pipeline_latency_avg_ms,
            snapshot.pipeline_latency_p50_ms,
            snapshot.pipeline_latency_p95_ms,
            snapshot.forbidden_trips,
            snapshot.input_rejections,
            snapshot.stale_results_discarded,
            snapshot.page_resets,
            snapshot.app_resets,
            snapshot.classifier_loads,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub translation_calls_total: usize,
    pub translation_unavailable: usize,
    pub pipeline_runs_total: usize,
    pub pipeline_runs_failed: usize,
    pub pipeline_latency_avg_ms: u64,
    pub pipeline_latency_p50_ms: u64,
    pub pipeline_latency_p95_ms: u64,
    pub forbidden_trips: usize,
    pub input_rejections: usize,
    pub stale_results_discarded: usize,
    pub page_resets: usize,
    pub app_resets: usize,
    pub classifier_loads: usize,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_translation(true);
        metrics.record_translation(false);
        metrics.record_pipeline_run(Duration::from_millis(100));
        metrics.record_forbidden_trip();
        metrics.record_reset("app");
        metrics.record_reset("page");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.translation_calls_total, 2);
        assert_eq!(snapshot.translation_unavailable, 1);
        assert_eq!(snapshot.pipeline_runs_total, 1);
        assert_eq!(snapshot.pipeline_latency_avg_ms, 100);
        assert_eq!(snapshot.forbidden_trips, 1);
        assert_eq!(snapshot.app_resets, 1);
        assert_eq!(snapshot.page_resets, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_translation(true);
        metrics.record_pipeline_run(Duration::from_millis(50));

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("translation_calls_total 1"));
        assert!(prometheus.contains("pipeline_runs_total 1"));
        assert!(prometheus.contains("pipeline_latency_p50_ms 50"));
        assert!(prometheus.contains("pipeline_latency_p95_ms 50"));
    }
}
