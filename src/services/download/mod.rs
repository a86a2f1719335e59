//! File download service.
//!
//! Requests arrive on a bounded queue; a single worker task starts
//! transfers while a semaphore caps how many run at once. Each body is
//! streamed to a temporary file while being hashed, then renamed into the
//! content-addressed layout from [`crate::storage`].

mod types;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::models::{DownloadStatus, DownloadedFile};
use crate::scrapers::HttpClient;
use crate::storage::{
    content_storage_path_with_name, filename_parts, partial_download_path, ContentHasher,
};
use crate::utils::url::classify;
use crate::utils::FileCategory;

pub use types::{DownloadFailure, DownloadOutcome, DownloadQueue, DownloadRequest};

/// Fetch one file into `config.directory`.
pub async fn download_file(
    client: &HttpClient,
    request: &DownloadRequest,
    config: &DownloadConfig,
) -> Result<DownloadedFile, DownloadError> {
    let mut response = client.fetch_stream(&request.url).await?;

    let dir = &config.directory;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| io_error(dir, source))?;

    let temp_path = partial_download_path(dir);
    let result = stream_to_file(&mut response, &temp_path, config.compute_md5).await;
    let hashes = match result {
        Ok(hashes) => hashes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };

    let mime_type = response
        .content_type()
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = response.content_disposition_filename();
    let (basename, extension) =
        filename_parts(&response.final_url, disposition.as_deref(), &mime_type);

    let final_path = content_storage_path_with_name(dir, &hashes.sha256, &basename, &extension);
    if let Some(parent) = final_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source))?;
    }

    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        // Same name and hash already stored: identical content.
        let _ = tokio::fs::remove_file(&temp_path).await;
    } else if let Err(source) = tokio::fs::rename(&temp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_error(&final_path, source));
    }

    let file_type = classify(&response.final_url, Some(mime_type.as_str())).unwrap_or(FileCategory::Other);
    debug!(
        "Downloaded {} ({} bytes) to {}",
        request.url,
        hashes.size,
        final_path.display()
    );

    Ok(DownloadedFile {
        id: uuid::Uuid::new_v4().to_string(),
        source_url: request.url.clone(),
        parent_url: request.parent_url.clone(),
        local_path: final_path,
        size: hashes.size,
        mime_type,
        file_type,
        sha256: hashes.sha256,
        md5: hashes.md5,
        is_duplicate: false,
        duplicate_group_id: None,
        original_file_id: None,
        status: DownloadStatus::Completed,
        downloaded_at: Utc::now(),
    })
}

async fn stream_to_file(
    response: &mut crate::scrapers::StreamingResponse,
    path: &Path,
    compute_md5: bool,
) -> Result<crate::storage::ContentHashes, DownloadError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|source| io_error(path, source))?;
    let mut hasher = ContentHasher::new(compute_md5);

    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|source| io_error(path, source))?;
    }
    file.flush().await.map_err(|source| io_error(path, source))?;

    Ok(hasher.finish())
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Background downloader fed through a [`DownloadQueue`].
///
/// Outcomes are published as each transfer ends; poll them with
/// [`Downloader::try_next`] while the crawl runs.
pub struct Downloader {
    queue: DownloadQueue,
    outcomes: mpsc::UnboundedReceiver<DownloadOutcome>,
    worker: JoinHandle<()>,
}

impl Downloader {
    /// Start the worker. Transfers share `client`'s rate limiter and cookies.
    pub fn spawn(client: HttpClient, config: DownloadConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, outcome_tx, client, config));
        Self {
            queue: DownloadQueue { tx },
            outcomes,
            worker,
        }
    }

    pub fn queue(&self) -> DownloadQueue {
        self.queue.clone()
    }

    pub async fn enqueue(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        self.queue.enqueue(request).await
    }

    /// A finished transfer, if one is waiting.
    pub fn try_next(&mut self) -> Option<DownloadOutcome> {
        self.outcomes.try_recv().ok()
    }

    /// Close the queue and wait for every accepted transfer, returning the
    /// outcomes not yet taken through [`Downloader::try_next`].
    ///
    /// Queue clones held elsewhere must be dropped first, or this waits
    /// for them.
    pub async fn finish(self) -> Vec<DownloadOutcome> {
        let Self {
            queue,
            mut outcomes,
            worker,
        } = self;
        drop(queue);

        let mut remaining = Vec::new();
        while let Some(outcome) = outcomes.recv().await {
            remaining.push(outcome);
        }
        if let Err(e) = worker.await {
            error!("Download worker failed: {}", e);
        }
        remaining
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<DownloadRequest>,
    outcomes: mpsc::UnboundedSender<DownloadOutcome>,
    client: HttpClient,
    config: DownloadConfig,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));
    let config = Arc::new(config);
    let mut tasks: JoinSet<()> = JoinSet::new();

    while let Some(request) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        while let Some(done) = tasks.try_join_next() {
            reap(done);
        }

        let client = client.clone();
        let config = Arc::clone(&config);
        let outcomes = outcomes.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = download_file(&client, &request, &config)
                .await
                .map_err(|e| {
                    warn!("Download of {} failed: {}", request.url, e);
                    DownloadFailure {
                        url: request.url.clone(),
                        error: e.to_string(),
                    }
                });
            // The receiver is gone only if the downloader was dropped.
            let _ = outcomes.send(outcome);
        });
    }

    while let Some(done) = tasks.join_next().await {
        reap(done);
    }
}

fn reap(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!("Download task panicked: {}", e);
    }
}
