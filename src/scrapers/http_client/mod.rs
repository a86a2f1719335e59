//! HTTP client with manual redirects, retries and adaptive rate limiting.

mod cookies;
mod decode;
mod response;
mod user_agent;

pub use cookies::{CookieJar, SessionCookie};
pub use decode::{charset_from_content_type, decode_body, is_textual, DecodedText};
pub use response::{
    parse_content_disposition_filename, parse_retry_after, FetchResponse, StreamingResponse,
};
pub use user_agent::{resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use tracing::{debug, warn};
use url::Url;

use super::rate_limiter::{DomainSlot, RateLimiter};
use crate::error::{ErrorCategory, FetchError};
use response::{header_map, ResponseHead};

/// Retry and redirect policy for the client.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `retry_delay * 2^n`.
    pub retry_delay: Duration,
    pub max_redirects: usize,
    pub user_agent: Option<String>,
    pub custom_headers: HashMap<String, String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            max_redirects: 10,
            user_agent: None,
            custom_headers: HashMap::new(),
        }
    }
}

/// HTTP client shared by page fetches and file downloads.
///
/// Redirects are followed by hand so every hop passes through the rate
/// limiter and the cookie jar, and the chain is recorded for the caller.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
    headers: HeaderMap,
    options: FetchOptions,
    rate_limiter: RateLimiter,
    cookies: CookieJar,
    cancelled: Option<Arc<AtomicBool>>,
}

impl HttpClient {
    /// Create a new HTTP client with its own rate limiter.
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        Self::with_rate_limiter(options, RateLimiter::new())
    }

    /// Create a new HTTP client with a shared rate limiter.
    pub fn with_rate_limiter(
        options: FetchOptions,
        rate_limiter: RateLimiter,
    ) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(options.user_agent.as_deref());
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(options.timeout)
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to create HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.custom_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => warn!("Ignoring invalid custom header {}", name),
            }
        }

        Ok(Self {
            client,
            user_agent,
            headers,
            options,
            rate_limiter,
            cookies: CookieJar::new(),
            cancelled: None,
        })
    }

    /// Abort between attempts and redirect hops once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Resolved user agent sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Session cookies, for saving across runs.
    pub async fn export_cookies(&self) -> Vec<SessionCookie> {
        self.cookies.export().await
    }

    /// Restore session cookies from an earlier run.
    pub async fn import_cookies(&self, cookies: Vec<SessionCookie>) {
        self.cookies.import(cookies).await;
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Fetch a URL and read the whole body.
    ///
    /// Transient, rate-limited and server errors are retried with exponential
    /// backoff. Permanent and auth errors return immediately.
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        self.with_retries(url, move || async move {
            let (head, response, slot) = self.send_following_redirects(url).await?;
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::from_reqwest(&head.final_url, e))?;
            drop(slot);
            Ok(FetchResponse::new(
                url,
                head,
                body.to_vec(),
                started.elapsed(),
            ))
        })
        .await
    }

    /// Fetch a URL and return the response before reading the body.
    pub async fn fetch_stream(&self, url: &str) -> Result<StreamingResponse, FetchError> {
        self.with_retries(url, move || async move {
            let (head, response, slot) = self.send_following_redirects(url).await?;
            Ok(StreamingResponse::new(head, response, slot))
        })
        .await
    }

    /// Get page content as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.fetch(url).await?;
        Ok(response
            .text
            .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned()))
    }

    async fn with_retries<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if self.is_cancelled() {
                return Err(FetchError::Cancelled(url.to_string()));
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let category = err.category();
            if !category.is_retryable() {
                return Err(err);
            }
            if attempt >= self.options.max_retries {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    url,
                    attempt + 1,
                    err
                );
                return Err(err);
            }

            let delay = self.retry_delay(&err, attempt);
            debug!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempt + 1,
                url,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Backoff before retry number `attempt + 1`.
    fn retry_delay(&self, err: &FetchError, attempt: u32) -> Duration {
        let exponential = self
            .options
            .retry_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let delay = match (err.category(), err) {
            (ErrorCategory::RateLimited, FetchError::Status { retry_after, .. }) => {
                retry_after.unwrap_or_else(|| exponential.saturating_mul(4))
            }
            _ => exponential,
        };
        delay.min(self.rate_limiter.config().max_delay)
    }

    /// Send a GET, following redirects by hand up to `max_redirects` hops.
    ///
    /// Returns the final response only if its status is 2xx.
    async fn send_following_redirects(
        &self,
        url: &str,
    ) -> Result<(ResponseHead, Response, Option<DomainSlot>), FetchError> {
        let mut current = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(current.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let mut chain: Vec<String> = Vec::new();

        for hop in 0..=self.options.max_redirects {
            if hop > 0 && self.is_cancelled() {
                return Err(FetchError::Cancelled(current.to_string()));
            }

            let slot = self.rate_limiter.acquire(current.as_str()).await;

            let mut request = self.client.get(current.clone()).headers(self.headers.clone());
            if let Some(cookie) = self.cookies.header_for(&current).await {
                request = request.header(COOKIE, cookie);
            }

            let sent_at = Instant::now();
            let response = request
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(current.as_str(), e))?;
            let elapsed = sent_at.elapsed();
            let status = response.status().as_u16();

            let set_cookies: Vec<&str> = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            self.cookies.store(&current, set_cookies).await;

            if let Some(ref slot) = slot {
                self.rate_limiter
                    .report_response(slot.domain(), status, elapsed)
                    .await;
            }

            if response.status().is_redirection() {
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| current.join(loc).ok());
                if let Some(next) = next {
                    debug!("Redirect {} {} -> {}", status, current, next);
                    chain.push(current.to_string());
                    current = next;
                    continue;
                }
            }

            let headers = header_map(&response);
            if !response.status().is_success() {
                return Err(FetchError::Status {
                    url: current.to_string(),
                    status,
                    retry_after: headers
                        .get("retry-after")
                        .and_then(|v| parse_retry_after(v)),
                });
            }

            let head = ResponseHead {
                final_url: current.to_string(),
                status,
                headers,
                redirect_chain: chain,
            };
            return Ok((head, response, slot));
        }

        Err(FetchError::TooManyRedirects {
            url: url.to_string(),
            hops: self.options.max_redirects,
        })
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("user_agent", &self.user_agent)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
