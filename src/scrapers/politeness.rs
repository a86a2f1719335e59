//! Robots compliance combined with the shared rate limiter.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::robots::{RobotsCache, RobotsTxt};
use crate::error::FetchError;
use crate::utils::url::host_key;

/// Gatekeeper consulted before every page fetch.
///
/// Owns the robots cache; shares the rate limiter with the HTTP client so
/// robots `Crawl-delay` values feed straight into request pacing.
#[derive(Debug, Clone)]
pub struct Politeness {
    robots: RobotsCache,
    rate_limiter: RateLimiter,
    user_agent: String,
    respect_robots: bool,
}

impl Politeness {
    pub fn new(
        rate_limiter: RateLimiter,
        user_agent: &str,
        respect_robots: bool,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        // robots.txt frequently redirects (http -> https), so this client
        // keeps reqwest's default redirect policy.
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to create robots client: {e}")))?;

        Ok(Self {
            robots: RobotsCache::new(client),
            rate_limiter,
            user_agent: user_agent.to_string(),
            respect_robots,
        })
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn respects_robots(&self) -> bool {
        self.respect_robots
    }

    /// Whether robots.txt permits fetching `url`.
    ///
    /// Always true when robots compliance is disabled. Applies the group's
    /// Crawl-delay to the domain as a side effect.
    pub async fn allows(&self, url: &str) -> bool {
        if !self.respect_robots {
            return true;
        }
        let Some(robots) = self.robots.get(url).await else {
            return true;
        };
        self.apply_crawl_delay(url, &robots).await;

        let allowed = match url::Url::parse(url) {
            Ok(parsed) => robots.is_url_allowed(&self.user_agent, &parsed),
            Err(_) => true,
        };
        if !allowed {
            debug!("robots.txt disallows {}", url);
        }
        allowed
    }

    async fn apply_crawl_delay(&self, url: &str, robots: &Arc<RobotsTxt>) {
        if let (Some(delay), Some(domain)) = (robots.crawl_delay(&self.user_agent), host_key(url)) {
            self.rate_limiter.set_floor_delay(&domain, delay).await;
        }
    }

    /// Sitemaps advertised by the URL's robots.txt.
    pub async fn sitemaps(&self, url: &str) -> Vec<String> {
        match self.robots.get(url).await {
            Some(robots) => robots.sitemaps().to_vec(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::rate_limiter::RateLimitConfig;
    use httpmock::{Method::GET, MockServer};

    fn limiter() -> RateLimiter {
        RateLimiter::with_config(RateLimitConfig {
            default_delay: Duration::ZERO,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_allows_and_crawl_delay() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(200).body(
                    "User-agent: *\nDisallow: /private\nCrawl-delay: 1\nSitemap: https://example.com/sitemap.xml\n",
                );
            })
            .await;

        let politeness =
            Politeness::new(limiter(), "TestBot/1.0", true, Duration::from_secs(5)).unwrap();
        assert!(politeness.allows(&server.url("/public/private-ish")).await);
        assert!(!politeness.allows(&server.url("/private/page")).await);

        let domain = host_key(&server.base_url()).unwrap();
        assert_eq!(
            politeness.rate_limiter().current_delay(&domain).await,
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            politeness.sitemaps(&server.url("/")).await,
            vec!["https://example.com/sitemap.xml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_disabled_robots_allows_everything() {
        let politeness =
            Politeness::new(limiter(), "TestBot/1.0", false, Duration::from_secs(5)).unwrap();
        // Never contacts the network.
        assert!(politeness.allows("http://127.0.0.1:9/private").await);
    }
}
