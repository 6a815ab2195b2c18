//! Per-source dispatch counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// One dispatch outcome that is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Every event received.
    Total,
    /// Foreign domain or excluded action.
    Filtered,
    /// Unparseable event or engine failure.
    Errored,
    /// Routed to the rule engine.
    Rule,
    /// Routed to the model engine.
    Model,
    /// Event type routed to neither engine.
    Invalid,
    /// No event type.
    MissingType,
    /// End-of-stream marker.
    End,
}

/// Counters for one source.
#[derive(Debug, Default)]
pub struct SourceCounters {
    total: AtomicU64,
    filtered: AtomicU64,
    errored: AtomicU64,
    rule: AtomicU64,
    model: AtomicU64,
    invalid: AtomicU64,
    missing_type: AtomicU64,
    end: AtomicU64,
}

impl SourceCounters {
    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Total => &self.total,
            Counter::Filtered => &self.filtered,
            Counter::Errored => &self.errored,
            Counter::Rule => &self.rule,
            Counter::Model => &self.model,
            Counter::Invalid => &self.invalid,
            Counter::MissingType => &self.missing_type,
            Counter::End => &self.end,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.slot(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.slot(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.get(Counter::Total),
            filtered: self.get(Counter::Filtered),
            errored: self.get(Counter::Errored),
            rule: self.get(Counter::Rule),
            model: self.get(Counter::Model),
            invalid: self.get(Counter::Invalid),
            missing_type: self.get(Counter::MissingType),
            end: self.get(Counter::End),
        }
    }
}

/// JSON-serializable counter values for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total: u64,
    pub filtered: u64,
    pub errored: u64,
    pub rule: u64,
    pub model: u64,
    pub invalid: u64,
    pub missing_type: u64,
    pub end: u64,
}

/// Bucket for sources that are not configured.
pub const OTHER_SOURCE: &str = "other";

/// Counters for the configured sources plus [`OTHER_SOURCE`].
///
/// The set of buckets is fixed at construction; unknown source names share
/// the `other` bucket.
#[derive(Debug)]
pub struct DispatchCounters {
    sources: HashMap<String, Arc<SourceCounters>>,
    other: Arc<SourceCounters>,
}

impl DispatchCounters {
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Self {
        let other = Arc::new(SourceCounters::default());
        let sources = sources
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| *name != OTHER_SOURCE)
            .map(|name| (name.to_string(), Arc::new(SourceCounters::default())))
            .collect();
        Self { sources, other }
    }

    /// Counters of `source`, or the `other` bucket when it is not configured.
    pub fn source(&self, source: &str) -> Arc<SourceCounters> {
        self.sources.get(source).unwrap_or(&self.other).clone()
    }

    /// Snapshot of every bucket, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, CounterSnapshot> {
        self.sources
            .iter()
            .map(|(name, counters)| (name.clone(), counters.snapshot()))
            .chain(std::iter::once((OTHER_SOURCE.to_string(), self.other.snapshot())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_source() {
        let counters = DispatchCounters::new(&["http", "bus"]);
        counters.source("http").incr(Counter::Total);
        counters.source("http").incr(Counter::Total);
        counters.source("http").incr(Counter::Rule);
        counters.source("bus").incr(Counter::End);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["http"].total, 2);
        assert_eq!(snapshot["http"].rule, 1);
        assert_eq!(snapshot["bus"].end, 1);
        assert_eq!(snapshot["bus"].total, 0);
        assert_eq!(snapshot[OTHER_SOURCE], CounterSnapshot::default());
    }

    #[test]
    fn unknown_sources_share_one_bucket() {
        let counters = DispatchCounters::new(&["http"]);
        for i in 0..10_000 {
            counters.source(&format!("caller-{i}")).incr(Counter::Total);
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[OTHER_SOURCE].total, 10_000);
        assert_eq!(snapshot["http"].total, 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(DispatchCounters::new(&["http"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.source("http").incr(Counter::Total);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counters.snapshot()["http"].total, 8000);
    }

    #[test]
    fn snapshot_serializes_snake_case() {
        let json = serde_json::to_value(CounterSnapshot::default()).unwrap();
        assert!(json.get("missing_type").is_some());
    }
}
