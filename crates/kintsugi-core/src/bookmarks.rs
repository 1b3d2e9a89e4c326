//! Bookmarks: at most one per page, newest first

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub page: usize,
    /// Creation time, epoch milliseconds
    pub at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Bookmark>", into = "Vec<Bookmark>")]
pub struct Bookmarks {
    entries: Vec<Bookmark>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookmark `page`. Returns false if it was already bookmarked.
    pub fn add(&mut self, page: usize, at: i64) -> bool {
        if self.contains(page) {
            return false;
        }
        self.entries.insert(0, Bookmark { page, at });
        true
    }

    pub fn remove(&mut self, page: usize) -> bool {
        let before = self.entries.len();
        self.entries.retain(|b| b.page != page);
        self.entries.len() != before
    }

    pub fn contains(&self, page: usize) -> bool {
        self.entries.iter().any(|b| b.page == page)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Bookmark>> for Bookmarks {
    /// Keeps the first bookmark seen for each page.
    fn from(entries: Vec<Bookmark>) -> Self {
        let mut bookmarks = Self::new();
        for entry in entries {
            if !bookmarks.contains(entry.page) {
                bookmarks.entries.push(entry);
            }
        }
        bookmarks
    }
}

impl From<Bookmarks> for Vec<Bookmark> {
    fn from(bookmarks: Bookmarks) -> Self {
        bookmarks.entries
    }
}
