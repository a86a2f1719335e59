//! Plain data records produced and consumed by the crawl pipeline.
//!
//! Every record here is serialisable so storage and export collaborators can
//! persist them without reaching into crawler internals.

mod file;
mod page;
mod progress;
mod rule;
mod site;
mod snapshot;

pub use file::{DownloadStatus, DownloadedFile, DuplicateGroup};
pub use page::{PageResources, ProcessingStatus, ScrapedPage};
pub use progress::{CrawlProgress, CrawlStatus, QueuedUrl};
pub use rule::{
    DataTransformation, ExtractionResult, ExtractionRule, ExtractionStatus, RuleType,
    TransformOperation,
};
pub use site::{NodeId, NodeStatus, SiteMapStats, SiteNode};
pub use snapshot::{ContentDiff, Snapshot, WatchAlert, WatchRule, WatchTrigger};
