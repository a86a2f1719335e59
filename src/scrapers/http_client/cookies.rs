//! Session cookie store.
//!
//! Cookies are captured from `Set-Cookie` on every response hop and replayed
//! on matching requests. The whole session can be exported and re-imported
//! as a flat list to continue a crawl later.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

/// A cookie in the crawl session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    /// Host the cookie applies to, without a leading dot.
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Whether subdomains of `domain` also receive the cookie.
    #[serde(default)]
    pub include_subdomains: bool,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

impl SessionCookie {
    /// Parse a `Set-Cookie` header value received from `request_url`.
    pub fn parse(header: &str, request_url: &Url) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let host = request_url.host_str()?.to_ascii_lowercase();
        let mut cookie = SessionCookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            path: default_path(request_url),
            secure: false,
            http_only: false,
            include_subdomains: false,
            expires: None,
        };

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
                None => (attr.trim().to_ascii_lowercase(), ""),
            };
            match key.as_str() {
                "domain" => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    // Reject cookies for unrelated domains.
                    if !domain.is_empty() && domain_matches(&host, &domain) {
                        cookie.domain = domain;
                        cookie.include_subdomains = true;
                    } else if !domain.is_empty() {
                        return None;
                    }
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "max-age" => {
                    if let Ok(secs) = val.parse::<i64>() {
                        cookie.expires = Some(Utc::now() + ChronoDuration::seconds(secs));
                    }
                }
                "expires" if cookie.expires.is_none() => {
                    cookie.expires = DateTime::parse_from_rfc2822(val)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc));
                }
                _ => {}
            }
        }

        Some(cookie)
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|e| e <= Utc::now())
    }

    /// Whether this cookie should be sent with a request to `url`.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let host_ok = if self.include_subdomains {
            domain_matches(&host, &self.domain)
        } else {
            host == self.domain
        };
        host_ok
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired()
    }
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

/// Shared, lock-guarded cookie list.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Arc<RwLock<Vec<SessionCookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every `Set-Cookie` value received from `url`.
    pub async fn store<'a>(&self, url: &Url, headers: impl IntoIterator<Item = &'a str>) {
        let parsed: Vec<SessionCookie> = headers
            .into_iter()
            .filter_map(|h| SessionCookie::parse(h, url))
            .collect();
        if parsed.is_empty() {
            return;
        }

        let mut cookies = self.cookies.write().await;
        for cookie in parsed {
            cookies.retain(|c| {
                !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
            });
            // An already-expired cookie is a deletion.
            if !cookie.is_expired() {
                cookies.push(cookie);
            }
        }
    }

    /// `Cookie` header value for a request to `url`, if any cookie applies.
    pub async fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies.read().await;
        let mut matching: Vec<&SessionCookie> = cookies.iter().filter(|c| c.matches(url)).collect();
        if matching.is_empty() {
            return None;
        }
        // Longer paths first.
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// All live cookies in the session.
    pub async fn export(&self) -> Vec<SessionCookie> {
        let cookies = self.cookies.read().await;
        cookies.iter().filter(|c| !c.is_expired()).cloned().collect()
    }

    /// Merge cookies into the session, replacing any with the same identity.
    pub async fn import(&self, imported: Vec<SessionCookie>) {
        let mut cookies = self.cookies.write().await;
        for cookie in imported.into_iter().filter(|c| !c.is_expired()) {
            cookies.retain(|c| {
                !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
            });
            cookies.push(cookie);
        }
    }

    pub async fn clear(&self) {
        self.cookies.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie = SessionCookie::parse(
            "sid=abc123; Path=/app; Domain=.example.com; Secure; HttpOnly",
            &url("https://www.example.com/app/login"),
        )
        .unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain, "example.com");
        assert_eq!(cookie.path, "/app");
        assert!(cookie.secure && cookie.http_only && cookie.include_subdomains);
    }

    #[test]
    fn test_parse_rejects_foreign_domain() {
        assert!(SessionCookie::parse(
            "a=b; Domain=evil.org",
            &url("https://example.com/")
        )
        .is_none());
    }

    #[test]
    fn test_default_path_and_host_only() {
        let cookie = SessionCookie::parse("a=b", &url("https://example.com/docs/page")).unwrap();
        assert_eq!(cookie.path, "/docs");
        assert!(!cookie.include_subdomains);
        assert!(cookie.matches(&url("https://example.com/docs/other")));
        assert!(!cookie.matches(&url("https://sub.example.com/docs/other")));
        assert!(!cookie.matches(&url("https://example.com/docsx")));
    }

    #[tokio::test]
    async fn test_jar_roundtrip_and_deletion() {
        let jar = CookieJar::new();
        let origin = url("https://example.com/");
        jar.store(&origin, ["a=1; Path=/", "b=2; Path=/; Secure"]).await;

        assert_eq!(
            jar.header_for(&url("https://example.com/x")).await.as_deref(),
            Some("a=1; b=2")
        );
        assert_eq!(
            jar.header_for(&url("http://example.com/x")).await.as_deref(),
            Some("a=1")
        );

        let exported = jar.export().await;
        let restored = CookieJar::new();
        restored.import(exported).await;
        assert_eq!(restored.export().await.len(), 2);

        jar.store(&origin, ["a=gone; Path=/; Max-Age=0"]).await;
        assert_eq!(
            jar.header_for(&url("https://example.com/x")).await.as_deref(),
            Some("b=2")
        );
    }
}
