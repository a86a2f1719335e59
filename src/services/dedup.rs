//! Hash-based duplicate detection for downloaded files.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{DownloadedFile, DuplicateGroup};
use crate::storage::hash_file;

/// Result of registering one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub is_duplicate: bool,
    /// First file registered with the same hash, when this one is a duplicate.
    pub original_file_id: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Member {
    id: String,
    size: u64,
}

/// Aggregate duplicate statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub total_files: usize,
    pub unique_hashes: usize,
    pub duplicate_files: usize,
    pub groups: usize,
    pub wasted_bytes: u64,
}

/// Owns the hash → file index and the duplicate groups derived from it.
///
/// Invariant: a group exists for a hash exactly when two or more files
/// share it, and its `duplicate_count` is `members.len() - 1`.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    by_hash: HashMap<String, Vec<Member>>,
    hash_of: HashMap<String, String>,
    groups: HashMap<String, DuplicateGroup>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file's content hash.
    ///
    /// Registering an id twice returns its current state without changes.
    pub fn register(&mut self, file_id: &str, hash: &str, size: u64) -> Registration {
        if self.hash_of.contains_key(file_id) {
            return self.registration_for(file_id);
        }

        self.hash_of.insert(file_id.to_string(), hash.to_string());
        let members = self.by_hash.entry(hash.to_string()).or_default();
        members.push(Member {
            id: file_id.to_string(),
            size,
        });

        if members.len() < 2 {
            return Registration {
                is_duplicate: false,
                original_file_id: None,
                group_id: None,
            };
        }

        let member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        let per_file = members[0].size;
        let original = member_ids[0].clone();

        let group = self
            .groups
            .entry(hash.to_string())
            .or_insert_with(|| DuplicateGroup {
                id: uuid::Uuid::new_v4().to_string(),
                hash: hash.to_string(),
                members: Vec::new(),
                original_file_id: original.clone(),
                total_size: 0,
                duplicate_count: 0,
                created_at: Utc::now(),
            });
        group.total_size = per_file * member_ids.len() as u64;
        group.duplicate_count = member_ids.len() - 1;
        group.members = member_ids;

        debug!(
            "File {} duplicates {} (hash {})",
            file_id,
            group.original_file_id,
            &hash[..hash.len().min(12)]
        );

        Registration {
            is_duplicate: true,
            original_file_id: Some(group.original_file_id.clone()),
            group_id: Some(group.id.clone()),
        }
    }

    /// Register a downloaded file and annotate it in place.
    pub fn register_file(&mut self, file: &mut DownloadedFile) -> Registration {
        let registration = self.register(&file.id, &file.sha256, file.size);
        file.is_duplicate = registration.is_duplicate;
        file.original_file_id = registration.original_file_id.clone();
        file.duplicate_group_id = registration.group_id.clone();
        registration
    }

    /// Remove a file. Its group shrinks, and is deleted once one member is left.
    ///
    /// Returns false for unknown ids.
    pub fn remove(&mut self, file_id: &str) -> bool {
        let Some(hash) = self.hash_of.remove(file_id) else {
            return false;
        };

        let remaining = match self.by_hash.get_mut(&hash) {
            Some(members) => {
                members.retain(|m| m.id != file_id);
                members.clone()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() {
            self.by_hash.remove(&hash);
        }

        if remaining.len() < 2 {
            self.groups.remove(&hash);
        } else if let Some(group) = self.groups.get_mut(&hash) {
            group.members = remaining.iter().map(|m| m.id.clone()).collect();
            group.duplicate_count = remaining.len() - 1;
            group.total_size = remaining[0].size * remaining.len() as u64;
            if group.original_file_id == file_id {
                group.original_file_id = remaining[0].id.clone();
            }
        }
        true
    }

    pub fn is_known(&self, hash: &str) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn group_for_hash(&self, hash: &str) -> Option<&DuplicateGroup> {
        self.groups.get(hash)
    }

    pub fn group_for_file(&self, file_id: &str) -> Option<&DuplicateGroup> {
        self.hash_of.get(file_id).and_then(|h| self.groups.get(h))
    }

    /// Duplicate groups, largest wasted space first.
    pub fn groups(&self) -> Vec<&DuplicateGroup> {
        let mut groups: Vec<&DuplicateGroup> = self.groups.values().collect();
        groups.sort_by(|a, b| {
            b.wasted_bytes()
                .cmp(&a.wasted_bytes())
                .then_with(|| a.hash.cmp(&b.hash))
        });
        groups
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            total_files: self.hash_of.len(),
            unique_hashes: self.by_hash.len(),
            duplicate_files: self.groups.values().map(|g| g.duplicate_count).sum(),
            groups: self.groups.len(),
            wasted_bytes: self.groups.values().map(|g| g.wasted_bytes()).sum(),
        }
    }

    fn registration_for(&self, file_id: &str) -> Registration {
        match self.group_for_file(file_id) {
            Some(group) if group.original_file_id != file_id => Registration {
                is_duplicate: true,
                original_file_id: Some(group.original_file_id.clone()),
                group_id: Some(group.id.clone()),
            },
            _ => Registration {
                is_duplicate: false,
                original_file_id: None,
                group_id: self.group_for_file(file_id).map(|g| g.id.clone()),
            },
        }
    }
}

/// Hash every regular file under `dir` (recursively) and group duplicates.
///
/// File ids are the paths relative to `dir`. Unreadable files are logged
/// and skipped.
pub async fn scan_directory(dir: &Path, compute_md5: bool) -> std::io::Result<DuplicateDetector> {
    let mut detector = DuplicateDetector::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        for path in files {
            match hash_file(&path, compute_md5).await {
                Ok(hashes) => {
                    let id = path
                        .strip_prefix(dir)
                        .unwrap_or(&path)
                        .display()
                        .to_string();
                    detector.register(&id, &hashes.sha256, hashes.size);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
    }
    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_registration_is_duplicate() {
        let mut detector = DuplicateDetector::new();
        let first = detector.register("a", "h1", 100);
        assert!(!first.is_duplicate);
        assert!(detector.group_for_hash("h1").is_none());

        let second = detector.register("b", "h1", 100);
        assert!(second.is_duplicate);
        assert_eq!(second.original_file_id.as_deref(), Some("a"));

        let group = detector.group_for_hash("h1").unwrap();
        assert_eq!(group.duplicate_count, 1);
        assert_eq!(group.members, vec!["a", "b"]);
        assert_eq!(group.total_size, 200);
        assert_eq!(second.group_id.as_deref(), Some(group.id.as_str()));
    }

    #[test]
    fn test_removing_member_deletes_group() {
        let mut detector = DuplicateDetector::new();
        detector.register("a", "h1", 10);
        detector.register("b", "h1", 10);

        assert!(detector.remove("b"));
        assert!(detector.group_for_hash("h1").is_none());
        assert!(detector.is_known("h1"));
        assert_eq!(detector.stats().duplicate_files, 0);
        assert!(!detector.remove("b"));
    }

    #[test]
    fn test_group_invariants_as_members_change() {
        let mut detector = DuplicateDetector::new();
        for id in ["a", "b", "c"] {
            detector.register(id, "h", 7);
        }
        let group = detector.group_for_hash("h").unwrap();
        assert_eq!(group.duplicate_count, group.members.len() - 1);
        assert_eq!(group.total_size, 21);
        assert_eq!(group.wasted_bytes(), 14);

        // Removing the original promotes the next member.
        detector.remove("a");
        let group = detector.group_for_hash("h").unwrap();
        assert_eq!(group.original_file_id, "b");
        assert_eq!(group.duplicate_count, 1);
        assert_eq!(group.total_size, 14);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut detector = DuplicateDetector::new();
        detector.register("a", "h", 1);
        detector.register("b", "h", 1);
        let again = detector.register("b", "h", 1);
        assert!(again.is_duplicate);
        assert_eq!(detector.group_for_hash("h").unwrap().members.len(), 2);
        assert!(!detector.register("a", "h", 1).is_duplicate);
    }

    #[test]
    fn test_groups_sorted_by_wasted_bytes() {
        let mut detector = DuplicateDetector::new();
        detector.register("s1", "small", 1);
        detector.register("s2", "small", 1);
        detector.register("b1", "big", 1000);
        detector.register("b2", "big", 1000);
        detector.register("u", "unique", 5);

        let groups = detector.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].hash, "big");

        let stats = detector.stats();
        assert_eq!(stats.total_files, 5);
        assert_eq!(stats.unique_hashes, 3);
        assert_eq!(stats.duplicate_files, 2);
        assert_eq!(stats.wasted_bytes, 1001);
    }

    #[tokio::test]
    async fn test_scan_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "same").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "same").unwrap();
        std::fs::write(dir.path().join("c.txt"), "different").unwrap();

        let detector = scan_directory(dir.path(), false).await.unwrap();
        let groups = detector.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(detector.stats().total_files, 3);
    }
}
