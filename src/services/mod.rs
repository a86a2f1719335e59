//! Services built on top of the crawl pipeline.
//!
//! The downloader is fed by the crawler; the site graph and change detector
//! are independent observers of its event stream.

pub mod change_detection;
pub mod dedup;
pub mod download;
pub mod site_graph;

pub use change_detection::{Capture, ChangeDetector};
pub use dedup::{DedupStats, DuplicateDetector, Registration};
pub use download::{
    download_file, DownloadFailure, DownloadOutcome, DownloadQueue, DownloadRequest, Downloader,
};
pub use site_graph::SiteGraph;
