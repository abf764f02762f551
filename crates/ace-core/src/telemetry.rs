//! Bounded in-memory metrics sink
//!
//! Components record counters and histogram samples here. Events are kept
//! in a fixed-capacity FIFO buffer (oldest evicted first) for inspection,
//! and are also forwarded to the `metrics` facade so an installed recorder
//! can export them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default number of retained events
pub const DEFAULT_CAPACITY: usize = 1000;

/// Event tags
pub type Tags = BTreeMap<String, String>;

/// Build tags from key/value pairs
#[must_use]
pub fn tags<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Tags
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// One recorded sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    /// Metric name (`.count` suffix for counters)
    pub name: String,
    /// Sample value, 1 for counters
    pub value: f64,
    /// Optional dimensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    /// Recording time
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity event buffer
#[derive(Debug)]
pub struct MetricsCollector {
    capacity: usize,
    events: Mutex<VecDeque<MetricsEvent>>,
}

impl MetricsCollector {
    /// Collector retaining at most `capacity` events
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record a counter event of value 1 named `{name}.count`
    pub fn increment(&self, name: &str, tags: Option<Tags>) {
        let name = format!("{name}.count");
        ::metrics::counter!(name.clone(), facade_labels(tags.as_ref())).increment(1);
        self.record(name, 1.0, tags);
    }

    /// Record a raw value
    pub fn histogram(&self, name: &str, value: f64, tags: Option<Tags>) {
        ::metrics::histogram!(name.to_string(), facade_labels(tags.as_ref())).record(value);
        self.record(name.to_string(), value, tags);
    }

    /// Copy of the retained events, oldest first
    #[must_use]
    pub fn get_metrics(&self) -> Vec<MetricsEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Drop every retained event
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Number of retained events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing is retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Maximum number of retained events
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn record(&self, name: String, value: f64, tags: Option<Tags>) {
        let event = MetricsEvent {
            name,
            value,
            tags,
            timestamp: Utc::now(),
        };

        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn facade_labels(tags: Option<&Tags>) -> Vec<::metrics::Label> {
    tags.map(|t| {
        t.iter()
            .map(|(k, v)| ::metrics::Label::new(k.clone(), v.clone()))
            .collect()
    })
    .unwrap_or_default()
}
