//! Robots.txt parser, matcher and per-host cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;

/// How long a fetched robots.txt stays valid.
pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<AgentGroup>,
    sitemaps: Vec<String>,
}

/// Rules shared by one or more consecutive `User-agent` lines.
#[derive(Debug, Clone, Default)]
struct AgentGroup {
    /// Lowercased agent tokens.
    agents: Vec<String>,
    rules: Vec<PathRule>,
    crawl_delay: Option<f64>,
}

#[derive(Debug, Clone)]
struct PathRule {
    allow: bool,
    pattern: PathPattern,
}

#[derive(Debug, Clone)]
enum PathPattern {
    Prefix(String),
    Wildcard(Regex),
}

impl PathPattern {
    fn new(value: &str) -> Option<Self> {
        if !value.contains('*') && !value.ends_with('$') {
            return Some(Self::Prefix(value.to_string()));
        }

        let (body, anchored) = match value.strip_suffix('$') {
            Some(body) => (body, true),
            None => (value, false),
        };
        let mut pattern = String::from("^");
        pattern.push_str(
            &body
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*"),
        );
        if anchored {
            pattern.push('$');
        }
        Regex::new(&pattern).ok().map(Self::Wildcard)
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Wildcard(re) => re.is_match(path),
        }
    }
}

impl RobotsTxt {
    /// Parse robots.txt content.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current = AgentGroup::default();
        // A user-agent line after rules starts a new group.
        let mut saw_rule = false;

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if saw_rule {
                        robots.push_group(std::mem::take(&mut current));
                        saw_rule = false;
                    }
                    if !value.is_empty() {
                        current.agents.push(value.to_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    saw_rule = true;
                    // An empty Disallow means "allow everything" and adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(pattern) = PathPattern::new(value) {
                        current.rules.push(PathRule {
                            allow: directive == "allow",
                            pattern,
                        });
                    }
                }
                "crawl-delay" => {
                    saw_rule = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            current.crawl_delay = Some(delay);
                        }
                    }
                }
                "sitemap" => {
                    // Sitemap lines stand outside groups.
                    if !value.is_empty() {
                        robots.sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        robots.push_group(current);

        robots
    }

    fn push_group(&mut self, group: AgentGroup) {
        if !group.agents.is_empty() {
            self.groups.push(group);
        }
    }

    /// Select the group for a user agent: exact token match, then substring,
    /// then `*`.
    fn group_for(&self, user_agent: &str) -> Option<&AgentGroup> {
        let agent_lower = user_agent.to_lowercase();
        let token = agent_lower
            .split(['/', ' '])
            .next()
            .unwrap_or_default()
            .to_string();

        let named = |pred: &dyn Fn(&str) -> bool| {
            self.groups
                .iter()
                .find(|g| g.agents.iter().any(|a| a != "*" && pred(a)))
        };

        named(&|a: &str| a == agent_lower || a == token)
            .or_else(|| named(&|a: &str| agent_lower.contains(a)))
            .or_else(|| {
                self.groups
                    .iter()
                    .find(|g| g.agents.iter().any(|a| a == "*"))
            })
    }

    /// Check if a path (optionally with query) is allowed for a user agent.
    ///
    /// Any matching Allow rule wins over every Disallow rule in the group.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let path = if path.is_empty() { "/" } else { path };
        let mut disallowed = false;
        for rule in &group.rules {
            if rule.pattern.matches(path) {
                if rule.allow {
                    return true;
                }
                disallowed = true;
            }
        }
        !disallowed
    }

    /// Check a full URL against the rules.
    pub fn is_url_allowed(&self, user_agent: &str, url: &Url) -> bool {
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        self.is_allowed(user_agent, &path)
    }

    /// Crawl delay declared for the user agent's group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .map(Duration::from_secs_f64)
    }

    /// Get listed sitemaps.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Check if robots.txt disallows all crawling.
    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }
}

/// Origin (`scheme://host[:port]`) whose robots.txt governs a URL.
pub fn robots_origin(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Fetch and parse robots.txt for an origin.
///
/// 200 parses the body and 404/410 mean "allow all". Any other status is
/// returned as an error so the caller can decide between failing open or closed.
pub async fn fetch_robots_txt(
    client: &reqwest::Client,
    origin: &str,
) -> Result<RobotsTxt, FetchError> {
    let url = format!("{}/robots.txt", origin.trim_end_matches('/'));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(&url, e))?;

    let status = response.status().as_u16();
    match status {
        200..=299 => {
            let content = response
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(&url, e))?;
            debug!("robots.txt for {}: {} bytes", origin, content.len());
            Ok(RobotsTxt::parse(&content))
        }
        404 | 410 => Ok(RobotsTxt::default()),
        _ => Err(FetchError::Status {
            url,
            status,
            retry_after: None,
        }),
    }
}

#[derive(Debug, Clone)]
struct CachedRobots {
    robots: Arc<RobotsTxt>,
    fetched_at: Instant,
}

/// One origin's entry. The mutex is held across the fetch so concurrent
/// callers for the same origin wait for a single request.
type RobotsSlot = Arc<Mutex<Option<CachedRobots>>>;

/// Per-origin robots.txt cache with a fixed time-to-live.
///
/// Fetch failures fail open: an allow-all entry is cached for the TTL.
#[derive(Debug, Clone)]
pub struct RobotsCache {
    client: reqwest::Client,
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, RobotsSlot>>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_ttl(client, ROBOTS_CACHE_TTL)
    }

    pub fn with_ttl(client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rules governing a URL, fetching them on first use or after expiry.
    ///
    /// Returns `None` only for URLs without a host.
    pub async fn get(&self, url: &str) -> Option<Arc<RobotsTxt>> {
        let parsed = Url::parse(url).ok()?;
        let origin = robots_origin(&parsed)?;

        let slot = self.slot(&origin).await;
        let mut cached = slot.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.robots.clone());
            }
        }

        let robots = match fetch_robots_txt(&self.client, &origin).await {
            Ok(robots) => robots,
            Err(e) => {
                warn!(
                    "Failed to fetch robots.txt for {}: {} (assuming allowed)",
                    origin, e
                );
                RobotsTxt::default()
            }
        };
        let robots = Arc::new(robots);
        *cached = Some(CachedRobots {
            robots: robots.clone(),
            fetched_at: Instant::now(),
        });
        Some(robots)
    }

    async fn slot(&self, origin: &str) -> RobotsSlot {
        if let Some(slot) = self.entries.read().await.get(origin) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write().await;
        Arc::clone(entries.entry(origin.to_string()).or_default())
    }

    /// Check a URL for a user agent. Unparseable URLs are allowed.
    pub async fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        match self.get(url).await {
            Some(robots) => robots.is_url_allowed(user_agent, &parsed),
            None => true,
        }
    }

    /// Drop all cached entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /public/
Crawl-delay: 2

Sitemap: https://example.com/sitemap.xml
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed("TestBot", "/public/page"));
        assert!(!robots.is_allowed("TestBot", "/private/page"));
        assert!(!robots.is_allowed("TestBot", "/admin/"));
        assert!(robots.is_allowed("TestBot", "/other/page"));

        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(2)));
        assert_eq!(robots.sitemaps(), ["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn test_disallow_is_prefix_not_substring() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /private\n");
        assert!(!robots.is_allowed("Bot", "/private/page"));
        assert!(!robots.is_allowed("Bot", "/private"));
        assert!(robots.is_allowed("Bot", "/public/private-ish"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let content = r#"
User-agent: *
Disallow: /private
Allow: /private/open
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("Bot", "/private/secret"));
        assert!(robots.is_allowed("Bot", "/private/open/page"));

        // Same path on both sides: allow still wins.
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /docs\nAllow: /docs\n");
        assert!(robots.is_allowed("Bot", "/docs/a"));
    }

    #[test]
    fn test_agent_selection_order() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: sitecrawl
Disallow: /exact

User-agent: crawl
Disallow: /substring
        "#;
        let robots = RobotsTxt::parse(content);

        // Exact token match wins over the substring group.
        assert!(!robots.is_allowed("SiteCrawl/0.4", "/exact"));
        assert!(robots.is_allowed("SiteCrawl/0.4", "/substring"));

        // Substring match.
        assert!(!robots.is_allowed("MegaCrawler", "/substring"));
        assert!(robots.is_allowed("MegaCrawler", "/page"));

        // Wildcard fallback.
        assert!(!robots.is_allowed("OtherBot", "/page"));
    }

    #[test]
    fn test_consecutive_agents_share_group() {
        let content = "User-agent: a-bot\nUser-agent: b-bot\nDisallow: /shared\n";
        let robots = RobotsTxt::parse(content);
        assert!(!robots.is_allowed("a-bot", "/shared"));
        assert!(!robots.is_allowed("b-bot", "/shared"));
        assert!(robots.is_allowed("c-bot", "/shared"));
    }

    #[test]
    fn test_wildcards_and_end_anchor() {
        let content = "User-agent: *\nDisallow: /*.pdf$\nDisallow: /tmp/*/cache\n";
        let robots = RobotsTxt::parse(content);
        assert!(!robots.is_allowed("Bot", "/docs/file.pdf"));
        assert!(robots.is_allowed("Bot", "/docs/file.pdf?download=1"));
        assert!(!robots.is_allowed("Bot", "/tmp/a/cache/x"));
        assert!(robots.is_allowed("Bot", "/tmp/cache"));
    }

    #[test]
    fn test_empty_disallow_allows_all() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(robots.is_allowed("Bot", "/anything"));
        assert!(!robots.disallows_all("Bot"));
    }

    #[test]
    fn test_comments_are_ignored() {
        let robots = RobotsTxt::parse("User-agent: * # everyone\nDisallow: /x # hidden\n");
        assert!(!robots.is_allowed("Bot", "/x/y"));
    }

    #[tokio::test]
    async fn test_cache_fetches_once_and_404_allows_all() {
        let server = MockServer::start_async().await;
        let robots_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(200).body("User-agent: *\nDisallow: /private\n");
            })
            .await;

        let cache = RobotsCache::new(reqwest::Client::new());
        assert!(!cache.is_allowed(&server.url("/private/a"), "Bot").await);
        assert!(cache.is_allowed(&server.url("/public"), "Bot").await);
        robots_mock.assert_calls_async(1).await;

        let missing = MockServer::start_async().await;
        missing
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(404);
            })
            .await;
        assert!(cache.is_allowed(&missing.url("/private/a"), "Bot").await);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let server = MockServer::start_async().await;
        let robots_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(200)
                    .delay(Duration::from_millis(100))
                    .body("User-agent: *\nDisallow: /private\n");
            })
            .await;

        let cache = RobotsCache::new(reqwest::Client::new());
        let mut tasks = tokio::task::JoinSet::new();
        for path in ["/a", "/b", "/private/c", "/d"] {
            let cache = cache.clone();
            let url = server.url(path);
            tasks.spawn(async move { cache.is_allowed(&url, "Bot").await });
        }
        let mut allowed = 0;
        while let Some(done) = tasks.join_next().await {
            if done.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 3);
        robots_mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_open() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(500);
            })
            .await;

        let origin = server.base_url();
        let err = fetch_robots_txt(&reqwest::Client::new(), &origin)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));

        let cache = RobotsCache::new(reqwest::Client::new());
        assert!(cache.is_allowed(&server.url("/anything"), "Bot").await);
    }
}
