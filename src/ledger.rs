//! Deduplicating failure accounting.
//!
//! Every check in the runner funnels divergences into an [`ErrorLedger`].
//! Identical messages are folded into a single [`ErrorEntry`] whose counter
//! grows, so a flapping condition shows up as one line with a count rather
//! than flooding the status board.

use serde::{Deserialize, Serialize};

/// A distinct failure message and how many times it was seen.
///
/// Serialized as a `[message, count]` pair, which is the wire shape the
/// status board expects inside `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u32)", into = "(String, u32)")]
pub struct ErrorEntry {
    pub message: String,
    pub occurrences: u32,
}

impl ErrorEntry {
    #[must_use]
    pub fn new(message: impl Into<String>, occurrences: u32) -> Self {
        Self {
            message: message.into(),
            occurrences: occurrences.max(1),
        }
    }
}

impl From<(String, u32)> for ErrorEntry {
    fn from((message, occurrences): (String, u32)) -> Self {
        Self::new(message, occurrences)
    }
}

impl From<ErrorEntry> for (String, u32) {
    fn from(entry: ErrorEntry) -> Self {
        (entry.message, entry.occurrences)
    }
}

/// Ordered, deduplicated collection of failures awaiting the next report.
#[derive(Debug, Default, Clone)]
pub struct ErrorLedger {
    entries: Vec<ErrorEntry>,
}

impl ErrorLedger {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record one occurrence of `message`.
    pub fn record(&mut self, message: impl Into<String>) {
        self.add(message.into(), 1);
    }

    /// Merge entries from another ledger, adding their counts to ours.
    pub fn record_batch<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = ErrorEntry>,
    {
        for entry in entries {
            self.add(entry.message, entry.occurrences);
        }
    }

    fn add(&mut self, message: String, occurrences: u32) {
        // ledgers hold a handful of distinct failure kinds, linear search is fine
        match self.entries.iter_mut().find(|e| e.message == message) {
            Some(existing) => existing.occurrences = existing.occurrences.saturating_add(occurrences),
            None => self.entries.push(ErrorEntry::new(message, occurrences)),
        }
    }

    /// Take everything recorded so far, leaving the ledger empty.
    ///
    /// The flag is `true` (passing) when nothing had been recorded.
    pub fn drain(&mut self) -> (bool, Vec<ErrorEntry>) {
        let entries = std::mem::take(&mut self.entries);
        (entries.is_empty(), entries)
    }

    /// Discard everything without reporting it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }
}
