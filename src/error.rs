//! Error types shared across the crawl pipeline.

use std::time::Duration;

use thiserror::Error;

/// How a failure should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Timeouts and dropped connections. Retry after a short delay.
    Transient,
    /// HTTP 429. Retry after a long delay.
    RateLimited,
    /// Bad URL, 404/410 and other client errors. Skip, never retry.
    Permanent,
    /// HTTP 401/403. Surface for manual intervention.
    AuthRequired,
    /// HTTP 5xx. Bounded retries, then skip.
    ServerError,
    /// Anything else. Log and skip.
    Unknown,
}

impl ErrorCategory {
    /// Categorise an HTTP status code that is not a success or redirect.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::AuthRequired,
            500..=599 => Self::ServerError,
            400..=499 => Self::Permanent,
            _ => Self::Unknown,
        }
    }

    /// Whether a request failing this way may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited | Self::ServerError)
    }
}

/// Errors from the fetch layer.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("Too many redirects ({hops}) starting at {url}")]
    TooManyRedirects { url: String, hops: usize },
    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
    #[error("Cancelled before fetching {0}")]
    Cancelled(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Map this failure onto the crawl-level handling category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::Timeout { .. } | FetchError::Connection { .. } => ErrorCategory::Transient,
            FetchError::Status { status, .. } => ErrorCategory::from_status(*status),
            FetchError::InvalidUrl(_) => ErrorCategory::Permanent,
            FetchError::TooManyRedirects { .. }
            | FetchError::Body { .. }
            | FetchError::Cancelled(_)
            | FetchError::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() || err.is_request() {
            FetchError::Connection {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else if err.is_builder() {
            FetchError::InvalidUrl(url.to_string())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Errors from the crawl orchestrator.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid seed URL: {0}")]
    InvalidSeed(String),
    #[error("A crawl is already running")]
    AlreadyRunning,
    #[error("Configuration cannot change while a crawl is {0}")]
    ReconfigureWhileActive(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors from the external page renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
    #[error("Render of {url} failed: {message}")]
    Failed { url: String, message: String },
    #[error("Render of {0} timed out")]
    Timeout(String),
}

/// Errors from file downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Download queue is closed")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_categories() {
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimited);
        assert_eq!(ErrorCategory::from_status(401), ErrorCategory::AuthRequired);
        assert_eq!(ErrorCategory::from_status(403), ErrorCategory::AuthRequired);
        assert_eq!(ErrorCategory::from_status(404), ErrorCategory::Permanent);
        assert_eq!(ErrorCategory::from_status(410), ErrorCategory::Permanent);
        assert_eq!(ErrorCategory::from_status(502), ErrorCategory::ServerError);
    }

    #[test]
    fn test_retryable_categories() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(ErrorCategory::RateLimited.is_retryable());
        assert!(ErrorCategory::ServerError.is_retryable());
        assert!(!ErrorCategory::Permanent.is_retryable());
        assert!(!ErrorCategory::AuthRequired.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_fetch_error_category() {
        let err = FetchError::Status {
            url: "https://example.com".into(),
            status: 404,
            retry_after: None,
        };
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert_eq!(err.status(), Some(404));

        let err = FetchError::Timeout {
            url: "https://example.com".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert_eq!(err.status(), None);
    }
}
