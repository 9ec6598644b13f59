//! Run metrics via the `metrics` facade.
//!
//! Counter totals are published once, after finalize. The [`CliRecorder`]
//! keeps them in memory and prints them when `--metrics` is passed.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, gauge,
};
use parking_lot::RwLock;

use opcount_isa::{Bucket, SummaryFamily};

use crate::report::Report;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "opcount_bucket_total",
        Unit::Count,
        "Instructions counted per bucket"
    );
    describe_counter!(
        "opcount_lane_ops_total",
        Unit::Count,
        "Active 64-bit lane operations per SIMD bucket"
    );
    describe_counter!(
        "opcount_family_total",
        Unit::Count,
        "Instructions counted per summary family"
    );
    describe_counter!(
        "opcount_threads_total",
        Unit::Count,
        "Threads whose counters were aggregated"
    );
    describe_gauge!(
        "opcount_replay_seconds",
        Unit::Seconds,
        "Wall-clock time spent replaying a trace"
    );
}

/// Publish a finished report.
pub fn record_report(report: &Report) {
    for bucket in Bucket::all() {
        let labels = [("bucket", bucket.name())];
        counter!("opcount_bucket_total", &labels).absolute(report.count(bucket));
        if bucket.lane_index().is_some() {
            counter!("opcount_lane_ops_total", &labels).absolute(report.lane_ops(bucket));
        }
    }
    for family in SummaryFamily::ALL {
        let labels = [("family", family.name())];
        counter!("opcount_family_total", &labels).absolute(report.family_total(family));
    }
    counter!("opcount_threads_total").absolute(u64::try_from(report.threads).unwrap_or(u64::MAX));
}

/// Record how long a replay took.
pub fn record_replay_time(secs: f64) {
    gauge!("opcount_replay_seconds").set(secs);
}

type Store<T> = Arc<RwLock<BTreeMap<String, T>>>;

struct CliCounter {
    key: String,
    store: Store<u64>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        let mut values = self.store.write();
        let slot = values.entry(self.key.clone()).or_insert(0);
        *slot = slot.wrapping_add(value);
    }

    fn absolute(&self, value: u64) {
        self.store.write().insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    store: Store<f64>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        *self.store.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.store.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.store.write().insert(self.key.clone(), value);
    }
}

/// In-memory recorder for terminal output.
#[derive(Default)]
pub struct CliRecorder {
    counters: Store<u64>,
    gauges: Store<f64>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = CliRecorderHandle {
            counters: Arc::clone(&self.counters),
            gauges: Arc::clone(&self.gauges),
        };
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            store: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            store: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Read access to what the [`CliRecorder`] collected.
pub struct CliRecorderHandle {
    counters: Store<u64>,
    gauges: Store<f64>,
}

impl CliRecorderHandle {
    #[must_use]
    pub fn counter(&self, key: &str) -> Option<u64> {
        self.counters.read().get(key).copied()
    }

    #[must_use]
    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.gauges.read().get(key).copied()
    }

    /// Print every metric, sorted by key, to stderr.
    pub fn print_summary(&self) {
        let counters = self.counters.read();
        let gauges = self.gauges.read();
        if counters.is_empty() && gauges.is_empty() {
            eprintln!("No metrics collected.");
            return;
        }

        eprintln!();
        eprintln!("## Metrics Summary");
        if !counters.is_empty() {
            eprintln!("### Counters");
            for (key, value) in counters.iter() {
                eprintln!("  {key}: {value}");
            }
        }
        if !gauges.is_empty() {
            eprintln!("### Gauges");
            for (key, value) in gauges.iter() {
                eprintln!("  {key}: {value:.6}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::Label;

    #[test]
    fn test_key_to_string() {
        let key = Key::from_name("opcount_threads_total");
        assert_eq!(key_to_string(&key), "opcount_threads_total");

        let key = Key::from_parts("opcount_bucket_total", vec![Label::new("bucket", "add_rr")]);
        assert_eq!(key_to_string(&key), "opcount_bucket_total{bucket=add_rr}");
    }

    #[test]
    fn test_recorder_storage() {
        let recorder = CliRecorder::new();
        let counter = CliCounter {
            key: "c".to_string(),
            store: Arc::clone(&recorder.counters),
        };
        metrics::CounterFn::increment(&counter, 5);
        metrics::CounterFn::increment(&counter, 2);
        assert_eq!(recorder.counters.read().get("c"), Some(&7));
        metrics::CounterFn::absolute(&counter, 1);
        assert_eq!(recorder.counters.read().get("c"), Some(&1));

        let gauge = CliGauge {
            key: "g".to_string(),
            store: Arc::clone(&recorder.gauges),
        };
        metrics::GaugeFn::set(&gauge, 0.5);
        metrics::GaugeFn::increment(&gauge, 1.0);
        assert_eq!(recorder.gauges.read().get("g"), Some(&1.5));
    }
}
