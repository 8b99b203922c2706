//! Size-bounded, seq-ordered buffer of log lines for one job.
//!
//! Every mutation keeps the window sorted ascending by `seq`, free of duplicate
//! `seq` values and at most [`WINDOW_MAX`] entries long, keeping the newest.
//! Because truncation always keeps the highest seqs of the union seen so far,
//! the final window does not depend on delivery order or redelivery.

use crate::model::LogEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Same cap the capture backend applies to its own per-tab deque.
pub const WINDOW_MAX: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<LogEntry>", into = "Vec<LogEntry>")]
pub struct LogWindow {
    entries: Vec<LogEntry>,
}

impl LogWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let mut window = Self::new();
        window.merge(entries);
        window
    }

    /// Insert one entry at its seq position. Returns `false` if the seq is
    /// already present (redelivery), leaving the window untouched.
    pub fn insert(&mut self, entry: LogEntry) -> bool {
        match self.entries.binary_search_by_key(&entry.seq, |e| e.seq) {
            Ok(_) => false,
            Err(pos) => {
                self.entries.insert(pos, entry);
                self.trim();
                true
            }
        }
    }

    /// Union-merge by seq, then keep the newest `WINDOW_MAX`.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = LogEntry>) {
        let mut by_seq: BTreeMap<u64, LogEntry> =
            self.entries.drain(..).map(|e| (e.seq, e)).collect();
        for entry in incoming {
            by_seq.entry(entry.seq).or_insert(entry);
        }
        let excess = by_seq.len().saturating_sub(WINDOW_MAX);
        self.entries = by_seq.into_values().skip(excess).collect();
    }

    fn trim(&mut self) {
        let excess = self.entries.len().saturating_sub(WINDOW_MAX);
        if excess > 0 {
            self.entries.drain(..excess);
        }
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.binary_search_by_key(&seq, |e| e.seq).is_ok()
    }

    pub fn max_seq(&self) -> Option<u64> {
        self.entries.last().map(|e| e.seq)
    }

    pub fn min_seq(&self) -> Option<u64> {
        self.entries.first().map(|e| e.seq)
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Sorted, unique and bounded.
    pub fn is_well_formed(&self) -> bool {
        self.entries.len() <= WINDOW_MAX && self.entries.windows(2).all(|w| w[0].seq < w[1].seq)
    }
}

impl From<Vec<LogEntry>> for LogWindow {
    fn from(entries: Vec<LogEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<LogWindow> for Vec<LogEntry> {
    fn from(window: LogWindow) -> Self {
        window.entries
    }
}

impl IntoIterator for LogWindow {
    type Item = LogEntry;
    type IntoIter = std::vec::IntoIter<LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a LogWindow {
    type Item = &'a LogEntry;
    type IntoIter = std::slice::Iter<'a, LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
