//! Crawl configuration.
//!
//! A [`CrawlConfig`] is loaded from TOML or JSON, validated once, and
//! captured immutably when a crawl starts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::models::{ExtractionRule, WatchRule};
use crate::scrapers::{FetchOptions, RateLimitConfig};
use crate::utils::url::path_extension;
use crate::utils::FileCategory;

/// Frontier ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStrategy {
    /// FIFO frontier.
    #[default]
    #[serde(alias = "breadth", alias = "bfs")]
    BreadthFirst,
    /// LIFO frontier.
    #[serde(alias = "depth", alias = "dfs")]
    DepthFirst,
}

/// Where and how discovered files are downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub max_concurrent_downloads: usize,
    /// Pending downloads accepted before `enqueue` waits.
    pub queue_capacity: usize,
    pub compute_md5: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("downloads"),
            max_concurrent_downloads: 3,
            queue_capacity: 256,
            compute_md5: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectionConfig {
    /// Snapshots kept per page; the oldest are evicted first.
    pub retention: usize,
    /// Alerts kept in memory; the oldest are dropped first.
    pub alert_retention: usize,
    pub watch_rules: Vec<WatchRule>,
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            retention: 10,
            alert_retention: 100,
            watch_rules: Vec::new(),
        }
    }
}

/// Policy for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub strategy: CrawlStrategy,
    #[serde(alias = "maxDepth")]
    pub max_depth: u32,
    /// 0 means unlimited.
    #[serde(alias = "maxPages")]
    pub max_pages: usize,
    #[serde(alias = "followExternalLinks")]
    pub follow_external_links: bool,
    #[serde(alias = "respectRobotsTxt")]
    pub respect_robots_txt: bool,
    /// Route pages through the configured renderer.
    #[serde(alias = "enableJavaScript")]
    pub enable_javascript: bool,
    /// Starting per-domain delay; overrides `rate_limit.default_delay`.
    #[serde(alias = "requestDelayMs")]
    pub request_delay_ms: u64,
    /// Global cap on pages in flight.
    #[serde(alias = "maxConcurrentRequests")]
    pub max_concurrent_requests: usize,
    /// Overrides `rate_limit.max_concurrent_per_domain`.
    pub max_concurrent_per_domain: usize,
    /// When non-empty, only URLs matching one of these are crawled.
    #[serde(alias = "urlWhitelist")]
    pub url_whitelist: Vec<String>,
    /// URLs matching any of these are skipped.
    #[serde(alias = "urlBlacklist")]
    pub url_blacklist: Vec<String>,
    /// Category ids (`pdf`, `image`...) or bare extensions (`csv`).
    #[serde(alias = "downloadFileTypes")]
    pub download_file_types: Vec<String>,
    #[serde(alias = "extractionRules")]
    pub extraction_rules: Vec<ExtractionRule>,
    #[serde(alias = "customHeaders")]
    pub custom_headers: HashMap<String, String>,
    /// `None` for the crawler's own agent, `"impersonate"` for a browser agent.
    #[serde(alias = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_redirects: usize,
    pub rate_limit: RateLimitConfig,
    pub download: DownloadConfig,
    pub change_detection: ChangeDetectionConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            strategy: CrawlStrategy::BreadthFirst,
            max_depth: 3,
            max_pages: 100,
            follow_external_links: false,
            respect_robots_txt: true,
            enable_javascript: false,
            request_delay_ms: 1000,
            max_concurrent_requests: 4,
            max_concurrent_per_domain: 2,
            url_whitelist: Vec::new(),
            url_blacklist: Vec::new(),
            download_file_types: Vec::new(),
            extraction_rules: Vec::new(),
            custom_headers: HashMap::new(),
            user_agent: None,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
            max_redirects: 10,
            rate_limit: RateLimitConfig::default(),
            download: DownloadConfig::default(),
            change_detection: ChangeDetectionConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Load configuration from a file. `.toml` files are read as TOML,
    /// anything else as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let config: CrawlConfig = match ext {
            "toml" => toml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the crawler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in self.url_whitelist.iter().chain(&self.url_blacklist) {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }

        let positive: [(&'static str, usize); 5] = [
            ("max_concurrent_requests", self.max_concurrent_requests),
            ("max_concurrent_per_domain", self.max_concurrent_per_domain),
            ("request_timeout_secs", self.request_timeout_secs as usize),
            (
                "download.max_concurrent_downloads",
                self.download.max_concurrent_downloads,
            ),
            ("download.queue_capacity", self.download.queue_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        let rl = &self.rate_limit;
        if !(rl.success_decay > 0.0 && rl.success_decay <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.success_decay",
                message: format!("{} is not in (0, 1]", rl.success_decay),
            });
        }
        for (field, value) in [
            ("rate_limit.rate_limit_multiplier", rl.rate_limit_multiplier),
            ("rate_limit.server_error_multiplier", rl.server_error_multiplier),
            ("rate_limit.slow_response_multiplier", rl.slow_response_multiplier),
        ] {
            if value < 1.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("{value} is below 1.0"),
                });
            }
        }

        for rule in &self.extraction_rules {
            if rule.field_name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "extraction_rules.field_name",
                    message: "must not be empty".to_string(),
                });
            }
        }

        for rule in &self.change_detection.watch_rules {
            if let Some(threshold) = rule.change_threshold {
                if !(0.0..=100.0).contains(&threshold) {
                    return Err(ConfigError::InvalidValue {
                        field: "change_detection.watch_rules.change_threshold",
                        message: format!("{threshold} is not a percentage"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Compute SHA-256 hash of the serialized config.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
            custom_headers: self.custom_headers.clone(),
        }
    }

    /// Limiter tuning with the top-level delay and per-domain cap applied.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            default_delay: Duration::from_millis(self.request_delay_ms),
            max_concurrent_per_domain: self.max_concurrent_per_domain,
            ..self.rate_limit.clone()
        }
    }

    /// Whether a discovered file should be handed to the downloader.
    pub fn should_download(&self, url: &str, category: FileCategory) -> bool {
        if self.download_file_types.is_empty() || !category.is_file() {
            return false;
        }
        let ext = url::Url::parse(url)
            .ok()
            .and_then(|u| path_extension(u.path()));

        self.download_file_types.iter().any(|wanted| {
            let wanted = wanted.trim().trim_start_matches('.').to_ascii_lowercase();
            FileCategory::from_id(&wanted) == Some(category) || ext.as_deref() == Some(&wanted)
        })
    }

    pub fn max_pages_reached(&self, scraped: u64) -> bool {
        self.max_pages > 0 && scraped >= self.max_pages as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CrawlConfig::default();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_pages, 100);
        assert!(config.respect_robots_txt);
        assert!(!config.follow_external_links);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_with_camel_case_aliases() {
        let json = r#"{
            "strategy": "depth_first",
            "maxDepth": 1,
            "followExternalLinks": true,
            "urlBlacklist": ["/logout"],
            "extractionRules": [
                {"field_name": "title", "rule_type": "css_selector", "selector": "h1"}
            ]
        }"#;
        let config: CrawlConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy, CrawlStrategy::DepthFirst);
        assert_eq!(config.max_depth, 1);
        assert!(config.follow_external_links);
        assert_eq!(config.url_blacklist, vec!["/logout"]);
        assert_eq!(config.extraction_rules.len(), 1);
        assert_eq!(config.max_pages, 100);
    }

    #[tokio::test]
    async fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
max_pages = 5
request_delay_ms = 0
download_file_types = ["pdf"]

[rate_limit]
success_decay = 0.8

[download]
directory = "/tmp/files"
"#
        )
        .unwrap();

        let config = CrawlConfig::load_from_path(file.path()).await.unwrap();
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.download.directory, PathBuf::from("/tmp/files"));
        assert_eq!(config.download.max_concurrent_downloads, 3);
        assert_eq!(config.rate_limit.success_decay, 0.8);
        assert_eq!(config.rate_limit_config().default_delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_load_rejects_bad_pattern() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"url_whitelist": ["("]}}"#).unwrap();
        let err = CrawlConfig::load_from_path(file.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = CrawlConfig {
            max_concurrent_requests: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "max_concurrent_requests",
                ..
            })
        ));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = CrawlConfig::default();
        let b = CrawlConfig {
            max_depth: 7,
            ..Default::default()
        };
        assert_eq!(a.hash(), CrawlConfig::default().hash());
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_should_download() {
        let config = CrawlConfig {
            download_file_types: vec!["pdf".into(), ".CSV".into(), "images".into()],
            ..Default::default()
        };
        assert!(config.should_download("https://e.com/a.pdf", FileCategory::Pdf));
        assert!(config.should_download("https://e.com/a.csv", FileCategory::Spreadsheet));
        assert!(config.should_download("https://e.com/a.png", FileCategory::Image));
        assert!(!config.should_download("https://e.com/a.zip", FileCategory::Archive));
        assert!(!config.should_download("https://e.com/", FileCategory::Page));
        assert!(!CrawlConfig::default().should_download("https://e.com/a.pdf", FileCategory::Pdf));
    }

    #[test]
    fn test_fetch_options() {
        let config = CrawlConfig {
            max_retries: 1,
            user_agent: Some("Bot/1".into()),
            ..Default::default()
        };
        let options = config.fetch_options();
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.user_agent.as_deref(), Some("Bot/1"));
        assert_eq!(options.timeout, Duration::from_secs(30));
    }
}
