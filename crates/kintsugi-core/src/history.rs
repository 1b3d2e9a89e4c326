//! Recently viewed pages
//!
//! Most recent first, one entry per page, at most [`HISTORY_LIMIT`]
//! entries. Revisiting a page moves it to the front.

use serde::{Deserialize, Serialize};

pub const HISTORY_LIMIT: usize = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub page: usize,
    /// Visit time, epoch milliseconds
    pub at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<HistoryEntry>", into = "Vec<HistoryEntry>")]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit(&mut self, page: usize, at: i64) {
        self.entries.retain(|h| h.page != page);
        self.entries.insert(0, HistoryEntry { page, at });
        self.entries.truncate(HISTORY_LIMIT);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<HistoryEntry>> for History {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            if history.len() == HISTORY_LIMIT {
                break;
            }
            if !history.entries.iter().any(|h| h.page == entry.page) {
                history.entries.push(entry);
            }
        }
        history
    }
}

impl From<History> for Vec<HistoryEntry> {
    fn from(history: History) -> Self {
        history.entries
    }
}
