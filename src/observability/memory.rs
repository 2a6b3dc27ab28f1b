//! In-memory metrics sink.
//!
//! Keeps every series in plain maps so tests and tooling can query exact
//! values without parsing scrape output.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;

use crate::observability::metrics::{Labels, MetricsSink};

type Series = (&'static str, Vec<(&'static str, String)>);

#[derive(Default)]
struct Store {
    counters: BTreeMap<Series, u64>,
    histograms: BTreeMap<Series, Vec<f64>>,
    gauges: BTreeMap<Series, f64>,
}

/// A [`MetricsSink`] that retains every observation in memory.
#[derive(Default)]
pub struct MemorySink {
    store: Mutex<Store>,
}

fn series(name: &'static str, labels: &Labels) -> Series {
    let mut labels = labels.to_vec();
    labels.sort();
    (name, labels)
}

fn matches(series: &Series, name: &str, filter: &[(&str, &str)]) -> bool {
    series.0 == name
        && filter
            .iter()
            .all(|(k, v)| series.1.iter().any(|(sk, sv)| sk == k && sv.as_str() == *v))
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().expect("memory sink mutex poisoned")
    }

    /// Sum of every counter series of `name` carrying all `filter` labels.
    pub fn counter(&self, name: &str, filter: &[(&str, &str)]) -> u64 {
        self.store()
            .counters
            .iter()
            .filter(|(s, _)| matches(s, name, filter))
            .map(|(_, v)| *v)
            .sum()
    }

    /// All values observed into histogram series of `name` matching `filter`.
    pub fn observations(&self, name: &str, filter: &[(&str, &str)]) -> Vec<f64> {
        self.store()
            .histograms
            .iter()
            .filter(|(s, _)| matches(s, name, filter))
            .flat_map(|(_, v)| v.iter().copied())
            .collect()
    }

    /// Value of the first gauge series of `name` matching `filter`.
    pub fn gauge(&self, name: &str, filter: &[(&str, &str)]) -> Option<f64> {
        self.store()
            .gauges
            .iter()
            .find(|(s, _)| matches(s, name, filter))
            .map(|(_, v)| *v)
    }

    /// Total counter increments and histogram observations across all series.
    pub fn total_observations(&self) -> u64 {
        let store = self.store();
        let counters: u64 = store.counters.values().sum();
        let histograms: usize = store.histograms.values().map(Vec::len).sum();
        counters + histograms as u64
    }
}

impl MetricsSink for MemorySink {
    fn increment_counter(&self, name: &'static str, labels: &Labels) {
        *self.store().counters.entry(series(name, labels)).or_default() += 1;
    }

    fn observe_histogram(&self, name: &'static str, labels: &Labels, value: f64) {
        self.store()
            .histograms
            .entry(series(name, labels))
            .or_default()
            .push(value);
    }

    fn set_gauge(&self, name: &'static str, labels: &Labels, value: f64) {
        self.store().gauges.insert(series(name, labels), value);
    }

    fn render(&self) -> String {
        let store = self.store();
        let mut out = String::new();
        let fmt_labels = |labels: &[(&'static str, String)]| {
            labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect::<Vec<_>>()
                .join(",")
        };
        for ((name, labels), value) in &store.counters {
            let _ = writeln!(out, "{}{{{}}} {}", name, fmt_labels(labels.as_slice()), value);
        }
        for ((name, labels), value) in &store.gauges {
            let _ = writeln!(out, "{}{{{}}} {}", name, fmt_labels(labels.as_slice()), value);
        }
        for ((name, labels), values) in &store.histograms {
            let sum: f64 = values.iter().sum();
            let labels = fmt_labels(labels.as_slice());
            let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, values.len());
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, sum);
        }
        out
    }
}
