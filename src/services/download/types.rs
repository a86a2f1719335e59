//! Download service types.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::DownloadError;
use crate::models::DownloadedFile;

/// A file the crawler wants fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    /// Page that linked to the file.
    pub parent_url: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: &str, parent_url: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            parent_url: parent_url.map(str::to_string),
        }
    }
}

/// A download that did not produce a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailure {
    pub url: String,
    pub error: String,
}

pub type DownloadOutcome = Result<DownloadedFile, DownloadFailure>;

/// Sending side of the download queue.
///
/// `enqueue` waits while the queue is full, applying backpressure to the
/// crawl loop.
#[derive(Debug, Clone)]
pub struct DownloadQueue {
    pub(super) tx: mpsc::Sender<DownloadRequest>,
}

impl DownloadQueue {
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| DownloadError::QueueClosed)
    }

    /// Requests waiting for a transfer slot.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
