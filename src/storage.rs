//! On-disk layout and hashing for downloaded files.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::utils::mime_to_extension;
use crate::utils::url::path_extension;

/// Chunk size used when hashing files from disk.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Construct the storage path for file content.
///
/// Uses a two-level directory structure based on hash prefix for filesystem efficiency:
/// `{dir}/{hash[0..2]}/{hash[0..8]}.{extension}`
pub fn content_storage_path(dir: &Path, content_hash: &str, extension: &str) -> PathBuf {
    dir.join(&content_hash[..2])
        .join(format!("{}.{}", &content_hash[..8], extension))
}

/// Construct the storage path with a readable basename.
///
/// `{dir}/{hash[0..2]}/{sanitized_basename}-{hash[0..8]}.{extension}`
pub fn content_storage_path_with_name(
    dir: &Path,
    content_hash: &str,
    basename: &str,
    extension: &str,
) -> PathBuf {
    let filename = format!(
        "{}-{}.{}",
        sanitize_filename(basename),
        &content_hash[..8],
        extension
    );
    dir.join(&content_hash[..2]).join(filename)
}

/// Temporary name used while a download is streaming, before its hash is known.
pub fn partial_download_path(dir: &Path) -> PathBuf {
    dir.join(format!(".partial-{}", uuid::Uuid::new_v4()))
}

/// Sanitize a string for use as a filename.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

/// Pick a basename and extension for a download.
///
/// Prefers the server's Content-Disposition filename, then the last URL
/// path segment, then `file` with an extension derived from the MIME type.
pub fn filename_parts(
    url: &str,
    disposition_filename: Option<&str>,
    mime_type: &str,
) -> (String, String) {
    let from_name = |name: &str| -> Option<(String, String)> {
        let ext = path_extension(name)?;
        let stem = name.rsplit_once('.')?.0;
        Some((stem.to_string(), ext))
    };

    if let Some(parts) = disposition_filename.and_then(from_name) {
        return parts;
    }

    let segment = url::Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut s| s.next_back().map(str::to_string))
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(&s).map(|d| d.into_owned()).unwrap_or(s))
    });
    if let Some(parts) = segment.as_deref().and_then(from_name) {
        return parts;
    }

    let basename = segment.unwrap_or_else(|| "file".to_string());
    (basename, mime_to_extension(mime_type).to_string())
}

/// Incremental SHA-256 and optional MD5 over a byte stream.
pub struct ContentHasher {
    sha256: Sha256,
    md5: Option<md5::Context>,
    size: u64,
}

/// Digests of a complete byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHashes {
    pub sha256: String,
    pub md5: Option<String>,
    pub size: u64,
}

impl ContentHasher {
    pub fn new(compute_md5: bool) -> Self {
        Self {
            sha256: Sha256::new(),
            md5: compute_md5.then(md5::Context::new),
            size: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.sha256.update(chunk);
        if let Some(md5) = self.md5.as_mut() {
            md5.consume(chunk);
        }
        self.size += chunk.len() as u64;
    }

    pub fn finish(self) -> ContentHashes {
        ContentHashes {
            sha256: hex::encode(self.sha256.finalize()),
            md5: self.md5.map(|ctx| format!("{:x}", ctx.compute())),
            size: self.size,
        }
    }
}

/// Hash a file on disk in fixed-size chunks without loading it whole.
pub async fn hash_file(path: &Path, compute_md5: bool) -> std::io::Result<ContentHashes> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = ContentHasher::new(compute_md5);
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Compute SHA-256 of in-memory content, hex encoded.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[test]
    fn test_content_storage_path() {
        let path = content_storage_path(Path::new("/data"), "abcdef1234567890", "pdf");
        assert_eq!(path, PathBuf::from("/data/ab/abcdef12.pdf"));

        let path = content_storage_path_with_name(
            Path::new("/data"),
            "abcdef1234567890",
            "annual: report?",
            "pdf",
        );
        assert_eq!(path, PathBuf::from("/data/ab/annual_ report-abcdef12.pdf"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("___"), "file");
        assert_eq!(sanitize_filename(&"é".repeat(150)).chars().count(), 100);
    }

    #[test]
    fn test_filename_parts() {
        assert_eq!(
            filename_parts("https://e.com/docs/report.PDF?x=1", None, "application/pdf"),
            ("report".to_string(), "pdf".to_string())
        );
        assert_eq!(
            filename_parts("https://e.com/download?id=3", Some("data.csv"), "text/csv"),
            ("data".to_string(), "csv".to_string())
        );
        assert_eq!(
            filename_parts("https://e.com/files/my%20file", None, "application/pdf"),
            ("my file".to_string(), "pdf".to_string())
        );
        assert_eq!(
            filename_parts("https://e.com/", None, "application/octet-stream"),
            ("file".to_string(), "bin".to_string())
        );
    }

    #[test]
    fn test_hasher_matches_known_digests() {
        let mut hasher = ContentHasher::new(true);
        hasher.update(b"hel");
        hasher.update(b"lo");
        let hashes = hasher.finish();
        assert_eq!(hashes.sha256, HELLO_SHA256);
        assert_eq!(hashes.md5.as_deref(), Some(HELLO_MD5));
        assert_eq!(hashes.size, 5);
        assert_eq!(sha256_hex(b"hello"), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_hash_file_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let content: Vec<u8> = (0..(HASH_CHUNK_SIZE * 3 + 17)).map(|i| i as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let hashes = hash_file(&path, false).await.unwrap();
        assert_eq!(hashes.sha256, sha256_hex(&content));
        assert_eq!(hashes.size, content.len() as u64);
        assert!(hashes.md5.is_none());
    }
}
