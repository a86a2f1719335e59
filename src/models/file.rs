//! Downloaded file and duplicate group records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::FileCategory;

/// Transfer state of a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

/// A file fetched by the downloader.
///
/// Created by the downloader, later annotated by the duplicate detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub id: String,
    pub source_url: String,
    /// Page that linked to the file.
    pub parent_url: Option<String>,
    pub local_path: PathBuf,
    pub size: u64,
    pub mime_type: String,
    pub file_type: FileCategory,
    pub sha256: String,
    pub md5: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_group_id: Option<String>,
    /// Id of the first file seen with this content, when this one is a duplicate.
    pub original_file_id: Option<String>,
    pub status: DownloadStatus,
    pub downloaded_at: DateTime<Utc>,
}

/// Files sharing an identical content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: String,
    pub hash: String,
    /// Member file ids in registration order.
    pub members: Vec<String>,
    pub original_file_id: String,
    /// Per-file size times member count.
    pub total_size: u64,
    /// Always `members.len() - 1`.
    pub duplicate_count: usize,
    pub created_at: DateTime<Utc>,
}

impl DuplicateGroup {
    /// Bytes that would be reclaimed by keeping only the original.
    pub fn wasted_bytes(&self) -> u64 {
        if self.members.is_empty() {
            return 0;
        }
        let per_file = self.total_size / self.members.len() as u64;
        per_file * self.duplicate_count as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasted_bytes() {
        let group = DuplicateGroup {
            id: "g".into(),
            hash: "abc".into(),
            members: vec!["a".into(), "b".into(), "c".into()],
            original_file_id: "a".into(),
            total_size: 300,
            duplicate_count: 2,
            created_at: Utc::now(),
        };
        assert_eq!(group.wasted_bytes(), 200);
    }
}
