//! Events published by the crawler.
//!
//! Observers (site graph, change detection, progress display, storage)
//! subscribe independently through a broadcast channel and never touch the
//! crawler's state.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::ErrorCategory;
use crate::models::{CrawlProgress, CrawlStatus, DownloadedFile, ScrapedPage};
use crate::utils::FileCategory;

/// Buffered events per subscriber before it starts lagging.
pub const EVENT_CAPACITY: usize = 4096;

/// Events emitted in one burst before the crawler yields to its observers.
/// Must stay well below [`EVENT_CAPACITY`].
pub const EMIT_YIELD_EVERY: usize = 256;

/// Why a URL was not fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Disallowed by robots.txt.
    Robots,
    /// Rejected by the whitelist or blacklist.
    Filtered,
    /// Beyond the maximum depth.
    TooDeep,
    /// The response was not an HTML page.
    NotHtml,
}

#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Started {
        seeds: Vec<String>,
        config_hash: String,
    },
    StatusChanged {
        from: CrawlStatus,
        to: CrawlStatus,
    },
    /// First sighting of a URL.
    UrlDiscovered {
        url: String,
        parent_url: Option<String>,
        depth: u32,
        category: FileCategory,
        queued: bool,
        external: bool,
    },
    PageScraped(Arc<ScrapedPage>),
    /// A non-page resource linked from a page.
    FileDiscovered {
        url: String,
        parent_url: String,
        category: FileCategory,
    },
    FileDownloaded(Arc<DownloadedFile>),
    PageSkipped {
        url: String,
        parent_url: Option<String>,
        depth: u32,
        reason: SkipReason,
    },
    PageFailed {
        url: String,
        parent_url: Option<String>,
        depth: u32,
        error: String,
        category: ErrorCategory,
        status: Option<u16>,
    },
    Progress(CrawlProgress),
    Completed(CrawlProgress),
}

/// Sending half shared by the crawler and its workers.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventSender {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Publish to every current subscriber. Events with no subscribers are dropped.
    pub fn emit(&self, event: CrawlEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_independent_subscribers() {
        let events = EventSender::new();
        assert_eq!(events.emit(CrawlEvent::Progress(CrawlProgress::new())), 0);

        let mut a = events.subscribe();
        let mut b = events.subscribe();
        assert_eq!(events.subscriber_count(), 2);

        let delivered = events.emit(CrawlEvent::StatusChanged {
            from: CrawlStatus::Idle,
            to: CrawlStatus::Initializing,
        });
        assert_eq!(delivered, 2);
        assert!(matches!(a.recv().await, Ok(CrawlEvent::StatusChanged { .. })));
        assert!(matches!(b.recv().await, Ok(CrawlEvent::StatusChanged { .. })));
    }
}
