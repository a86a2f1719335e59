//! Change-detection records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped, hashed capture of a page's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub page_url: String,
    pub captured_at: DateTime<Utc>,
    /// SHA-256 of the normalised text.
    pub content_hash: String,
    /// Normalised text (one trimmed, non-empty line per line).
    pub text_content: String,
    /// Gzip of `text_content`.
    pub compressed_content: Vec<u8>,
}

/// User-declared condition evaluated against each new snapshot of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRule {
    pub id: String,
    pub page_url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Change percentage (0-100) at or above which the rule fires.
    #[serde(default)]
    pub change_threshold: Option<f64>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_change_detected: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl WatchRule {
    pub fn new(page_url: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            page_url: page_url.to_string(),
            keywords: Vec::new(),
            change_threshold: None,
            is_enabled: true,
            last_checked: None,
            last_change_detected: None,
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_threshold(mut self, percent: f64) -> Self {
        self.change_threshold = Some(percent);
        self
    }
}

/// Line-level difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDiff {
    pub has_changes: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// `(old, new)` pairs at the same line position.
    pub modified: Vec<(String, String)>,
    pub change_percentage: f64,
}

impl ContentDiff {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Why a watch rule fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchTrigger {
    KeywordAppeared { keyword: String },
    ThresholdExceeded { change_percentage: f64, threshold: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchAlert {
    pub rule_id: String,
    pub page_url: String,
    pub triggers: Vec<WatchTrigger>,
    pub detected_at: DateTime<Utc>,
}
