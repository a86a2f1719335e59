//! HTTP response wrappers.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Response;

use super::decode::{decode_body, is_textual};
use crate::error::FetchError;
use crate::scrapers::rate_limiter::DomainSlot;

/// A fully read response, after redirects.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL originally requested.
    pub url: String,
    /// URL that produced the body.
    pub final_url: String,
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Decoded body for textual content types.
    pub text: Option<String>,
    /// Encoding used to produce `text`.
    pub encoding: Option<&'static str>,
    /// Every URL visited before `final_url`, starting with `url`.
    pub redirect_chain: Vec<String>,
    /// Time from the first request to the last body byte.
    pub response_time: Duration,
}

impl FetchResponse {
    pub(crate) fn new(
        url: &str,
        head: ResponseHead,
        body: Vec<u8>,
        response_time: Duration,
    ) -> Self {
        let content_type = head.headers.get("content-type").map(String::as_str);
        let (text, encoding) = if is_textual(content_type) {
            let decoded = decode_body(&body, content_type);
            (Some(decoded.text), Some(decoded.encoding))
        } else {
            (None, None)
        };

        Self {
            url: url.to_string(),
            final_url: head.final_url,
            status: head.status,
            headers: head.headers,
            body,
            text,
            encoding,
            redirect_chain: head.redirect_chain,
            response_time,
        }
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether any redirect was followed.
    pub fn was_redirected(&self) -> bool {
        !self.redirect_chain.is_empty()
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get the Content-Length header.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|s| s.parse().ok())
    }

    /// Whether the body is an HTML document.
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            None => self
                .text
                .as_deref()
                .is_some_and(|t| t.trim_start().starts_with('<')),
        }
    }

    /// Get the filename from Content-Disposition header.
    pub fn content_disposition_filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|h| parse_content_disposition_filename(h))
    }
}

/// Status line, headers and redirect history shared by both response kinds.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub redirect_chain: Vec<String>,
}

/// A response whose body has not been read yet, for streaming downloads.
///
/// Holds the domain's rate-limit slot until dropped.
#[derive(Debug)]
pub struct StreamingResponse {
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub redirect_chain: Vec<String>,
    pub(crate) response: Response,
    pub(crate) _slot: Option<DomainSlot>,
}

impl StreamingResponse {
    pub(crate) fn new(head: ResponseHead, response: Response, slot: Option<DomainSlot>) -> Self {
        Self {
            final_url: head.final_url,
            status: head.status,
            headers: head.headers,
            redirect_chain: head.redirect_chain,
            response,
            _slot: slot,
        }
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get the Content-Length header.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|s| s.parse().ok())
    }

    /// Get the filename from Content-Disposition header.
    pub fn content_disposition_filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|h| parse_content_disposition_filename(h))
    }

    /// Next chunk of the body, `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<bytes::Bytes>, FetchError> {
        self.response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.final_url, e))
    }
}

/// Collect response headers into a lowercase-keyed map.
///
/// Repeated headers are joined with `, `.
pub(crate) fn header_map(response: &Response) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(v);
                })
                .or_insert_with(|| v.to_string());
        }
    }
    headers
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Parse filename from Content-Disposition header value.
/// Parses both `filename="name.pdf"` and `filename*=UTF-8''name.pdf` formats.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    // RFC 5987 form first
    if let Some(start) = header.find("filename*=") {
        let rest = &header[start + 10..];
        if let Some(quote_start) = rest.find("''") {
            let encoded = rest[quote_start + 2..].split([';', ' ']).next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let filename = decoded.trim().to_string();
                if !filename.is_empty() {
                    return Some(filename);
                }
            }
        }
    }

    if let Some(start) = header.find("filename=") {
        let rest = &header[start + 9..];
        let filename = if let Some(quoted) = rest.strip_prefix('"') {
            quoted.split('"').next()
        } else {
            rest.split([';', ' ']).next()
        };

        if let Some(name) = filename {
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    None
}
