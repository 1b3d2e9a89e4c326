//! In-memory reader state and user-facing notices

use std::fmt;

use crate::bookmarks::Bookmarks;
use crate::document::Document;
use crate::history::History;
use crate::zoom::DEFAULT_SCALE;

/// Offline indicator as the user sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineStatus {
    /// No agent attached yet
    Checking,
    /// Agent active, snapshot installed
    Ready,
    /// No active agent
    Disabled,
    /// Refresh requested, waiting for the agent
    Caching,
    /// Agent reported a finished refresh
    Cached,
}

impl fmt::Display for OfflineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Checking => "Checking offline support",
            Self::Ready => "Offline ready",
            Self::Disabled => "Offline disabled",
            Self::Caching => "Caching…",
            Self::Cached => "Cached offline",
        })
    }
}

/// Transient, non-blocking message for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    BookmarkSaved,
    AlreadyBookmarked,
    KeyUpdated,
    AgentUnavailable,
    CacheRefreshed,
    UpdatingOffline,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BookmarkSaved => "Bookmark saved",
            Self::AlreadyBookmarked => "Already bookmarked",
            Self::KeyUpdated => "Encryption key updated",
            Self::AgentUnavailable => "Enable the offline agent first",
            Self::CacheRefreshed => "Offline cache refreshed",
            Self::UpdatingOffline => "Updating offline bundle",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReaderState {
    pub document: Option<Document>,
    pub current_page: usize,
    pub scale: f64,
    pub bookmarks: Bookmarks,
    pub history: History,
    pub offline: OfflineStatus,
    pub offline_ready: bool,
}

impl ReaderState {
    pub fn page_count(&self) -> usize {
        self.document.as_ref().map_or(0, Document::len)
    }

    /// How far through the document, 0-100.
    pub fn progress_percent(&self) -> u32 {
        let total = self.page_count();
        if total < 2 {
            return 0;
        }
        ((self.current_page as f64 / (total - 1) as f64) * 100.0).round() as u32
    }
}

impl Default for ReaderState {
    fn default() -> Self {
        Self {
            document: None,
            current_page: 0,
            scale: DEFAULT_SCALE,
            bookmarks: Bookmarks::new(),
            history: History::new(),
            offline: OfflineStatus::Checking,
            offline_ready: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::sample;

    #[test]
    fn test_progress() {
        let mut state = ReaderState {
            document: Some(sample(3)),
            ..ReaderState::default()
        };
        assert_eq!(state.progress_percent(), 0);

        state.current_page = 1;
        assert_eq!(state.progress_percent(), 50);

        state.current_page = 2;
        assert_eq!(state.progress_percent(), 100);
    }

    #[test]
    fn test_progress_single_page() {
        let state = ReaderState {
            document: Some(sample(1)),
            ..ReaderState::default()
        };
        assert_eq!(state.progress_percent(), 0);
        assert_eq!(ReaderState::default().progress_percent(), 0);
    }
}
