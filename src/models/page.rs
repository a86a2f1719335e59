//! Scraped page records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rule::ExtractionResult;

/// Where a page is in its fetch → parse → extract pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Fetching,
    Parsing,
    Extracting,
    Complete,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Extracting => "extracting",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Pipeline steps only move forward; terminal states are final.
    pub fn can_advance_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        match (self, next) {
            (Complete | Failed | Skipped, _) => false,
            (_, Failed | Skipped) => true,
            (Pending, Fetching) | (Fetching, Parsing) | (Parsing, Extracting) => true,
            (Extracting, Complete) => true,
            _ => false,
        }
    }
}

/// Resources referenced by a page, resolved to absolute URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResources {
    pub images: Vec<String>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
    /// Links whose category is not a page (PDFs, archives, media...).
    pub files: Vec<String>,
}

/// One successfully fetched page. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub id: String,
    pub url: String,
    /// URL after following redirects.
    pub final_url: String,
    pub parent_url: Option<String>,
    pub status_code: u16,
    /// Decoded markup as fetched (or rendered).
    pub content: String,
    /// Visible text with tags and entities stripped.
    pub text: String,
    pub title: Option<String>,
    pub metadata: HashMap<String, String>,
    pub depth: u32,
    /// Links that will be (or were) considered for crawling.
    pub links: Vec<String>,
    /// Links outside the crawl scope, recorded but not followed.
    pub external_links: Vec<String>,
    pub resources: PageResources,
    pub extraction: Vec<ExtractionResult>,
    pub processing_status: ProcessingStatus,
    pub redirect_chain: Vec<String>,
    /// SHA-256 of the visible text.
    pub content_hash: String,
    pub response_time_ms: u64,
    pub rendered: bool,
    pub fetched_at: DateTime<Utc>,
}

impl ScrapedPage {
    /// Look up an extracted field by name.
    pub fn field(&self, name: &str) -> Option<&ExtractionResult> {
        self.extraction.iter().find(|r| r.field_name == name)
    }

    /// Names of required fields that could not be extracted.
    pub fn failed_fields(&self) -> Vec<&str> {
        self.extraction
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.field_name.as_str())
            .collect()
    }
}
