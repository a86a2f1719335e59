//! Crawl lifecycle state and counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single crawl run.
///
/// `idle → initializing → running ⇄ paused → stopping → {completed | failed}`.
/// A finished crawler may start a new run from a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Idle,
    Initializing,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a run is in progress (configuration is frozen).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Running | Self::Paused | Self::Stopping
        )
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        use CrawlStatus::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Completed, Initializing)
                | (Failed, Initializing)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Running, Completed)
                | (Running, Failed)
                | (Stopping, Completed)
                | (Stopping, Failed)
        )
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable counters describing how far a crawl has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub status: CrawlStatus,
    /// URLs seen for the first time (seeds included).
    pub discovered: u64,
    /// Pages dequeued and attempted.
    pub processed: u64,
    /// URLs currently waiting in the frontier.
    pub queued: u64,
    /// Pages fetched, parsed and emitted.
    pub scraped: u64,
    /// Downloadable files discovered.
    pub files: u64,
    /// Failed page attempts.
    pub errors: u64,
    /// Links skipped by robots, filters or scope rules.
    pub skipped: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlProgress {
    pub fn new() -> Self {
        Self {
            status: CrawlStatus::Idle,
            discovered: 0,
            processed: 0,
            queued: 0,
            scraped: 0,
            files: 0,
            errors: 0,
            skipped: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// Fraction of `max_pages` processed, when a cap is set.
    pub fn completion_ratio(&self, max_pages: usize) -> Option<f64> {
        if max_pages == 0 {
            return None;
        }
        Some((self.processed as f64 / max_pages as f64).min(1.0))
    }
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// A URL waiting in the frontier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUrl {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl QueuedUrl {
    pub fn new(url: String, depth: u32, parent_url: Option<String>) -> Self {
        Self {
            url,
            depth,
            parent_url,
            discovered_at: Utc::now(),
        }
    }

    /// A seed URL at depth zero with no parent.
    pub fn seed(url: String) -> Self {
        Self::new(url, 0, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use CrawlStatus::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Initializing));

        assert!(!Idle.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Paused.can_transition_to(Completed));
    }

    #[test]
    fn test_active_and_terminal() {
        assert!(CrawlStatus::Paused.is_active());
        assert!(!CrawlStatus::Idle.is_active());
        assert!(CrawlStatus::Failed.is_terminal());
        assert!(!CrawlStatus::Stopping.is_terminal());
    }

    #[test]
    fn test_completion_ratio() {
        let mut progress = CrawlProgress::new();
        progress.processed = 5;
        assert_eq!(progress.completion_ratio(10), Some(0.5));
        assert_eq!(progress.completion_ratio(0), None);
    }
}
