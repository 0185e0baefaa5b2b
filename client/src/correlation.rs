//! Correlation tracking for duplicate push suppression.
//!
//! Moves, creates and joins come back twice: once in the RPC response and
//! once as a broadcast carrying the same correlation id. The tracker
//! remembers ids from both channels so the second copy can be skipped.
//! It is an optimization only; nothing authoritative is gated on it.

use crate::clock::now_ms;
use crate::config::{DEFAULT_CORRELATION_CAPACITY, DEFAULT_CORRELATION_RETENTION};
use log::debug;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Entry {
    recorded_at: i64,
    sequence: u64,
}

/// One bounded id → timestamp table.
#[derive(Debug)]
struct CorrelationTable {
    name: &'static str,
    entries: HashMap<String, Entry>,
    latest: Option<String>,
    next_sequence: u64,
    capacity: usize,
    retention_ms: i64,
}

impl CorrelationTable {
    fn new(name: &'static str, capacity: usize, retention: Duration) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            latest: None,
            next_sequence: 0,
            capacity: capacity.max(1),
            retention_ms: retention.as_millis() as i64,
        }
    }

    fn record(&mut self, id: &str, now: i64) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }

        self.entries.insert(
            id.to_string(),
            Entry {
                recorded_at: now,
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
        self.latest = Some(id.to_string());

        if self.entries.len() > self.capacity {
            self.prune(now);
        }
    }

    /// Drops entries past the retention window, then the oldest entries
    /// until the table is back at capacity.
    fn prune(&mut self, now: i64) {
        let before = self.entries.len();
        let cutoff = now.saturating_sub(self.retention_ms);
        self.entries.retain(|_, entry| entry.recorded_at >= cutoff);

        if self.entries.len() > self.capacity {
            let mut by_age: Vec<(String, Entry)> = self
                .entries
                .iter()
                .map(|(id, entry)| (id.clone(), *entry))
                .collect();
            by_age.sort_by_key(|(_, entry)| (entry.recorded_at, entry.sequence));

            let excess = self.entries.len() - self.capacity;
            for (id, _) in by_age.into_iter().take(excess) {
                self.entries.remove(&id);
            }
        }

        if let Some(latest) = &self.latest {
            if !self.entries.contains_key(latest) {
                self.latest = None;
            }
        }

        debug!(
            "Pruned {} {} correlation ids",
            before - self.entries.len(),
            self.name
        );
    }

    fn contains(&self, id: &str) -> bool {
        let id = id.trim();
        !id.is_empty() && self.entries.contains_key(id)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.latest = None;
    }
}

/// Ids issued through direct calls and ids observed through broadcasts.
#[derive(Debug)]
pub struct CorrelationTracker {
    issued: CorrelationTable,
    observed: CorrelationTable,
}

impl CorrelationTracker {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            issued: CorrelationTable::new("issued", capacity, retention),
            observed: CorrelationTable::new("observed", capacity, retention),
        }
    }

    pub fn record_issued(&mut self, id: &str) {
        self.record_issued_at(id, now_ms());
    }

    pub fn record_observed(&mut self, id: &str) {
        self.record_observed_at(id, now_ms());
    }

    pub fn record_issued_at(&mut self, id: &str, now: i64) {
        self.issued.record(id, now);
    }

    pub fn record_observed_at(&mut self, id: &str, now: i64) {
        self.observed.record(id, now);
    }

    pub fn was_issued(&self, id: &str) -> bool {
        self.issued.contains(id)
    }

    pub fn was_observed(&self, id: &str) -> bool {
        self.observed.contains(id)
    }

    pub fn most_recent_issued(&self) -> Option<&str> {
        self.issued.latest.as_deref()
    }

    pub fn most_recent_observed(&self) -> Option<&str> {
        self.observed.latest.as_deref()
    }

    pub fn issued_len(&self) -> usize {
        self.issued.entries.len()
    }

    pub fn observed_len(&self) -> usize {
        self.observed.entries.len()
    }

    pub fn clear(&mut self) {
        self.issued.clear();
        self.observed.clear();
    }
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_CAPACITY, DEFAULT_CORRELATION_RETENTION)
    }
}
