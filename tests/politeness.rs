//! Robots compliance and adaptive rate limiting against a mock server.

use std::time::Duration;

use httpmock::{Method::GET, MockServer};

use sitecrawl::crawler::CrawlEvent;
use sitecrawl::models::CrawlStatus;
use sitecrawl::scrapers::{RateLimitConfig, RateLimiter, RobotsTxt};
use sitecrawl::{CrawlConfig, Crawler, ErrorCategory};

fn quiet_config() -> CrawlConfig {
    CrawlConfig {
        request_delay_ms: 0,
        max_retries: 0,
        retry_delay_ms: 1,
        max_depth: 0,
        ..Default::default()
    }
}

#[test]
fn test_allow_overrides_broader_disallow() {
    let robots = RobotsTxt::parse(
        "User-agent: *\n\
         Disallow: /private\n\
         Allow: /private/open\n",
    );

    assert!(!robots.is_allowed("sitecrawl", "/private/page"));
    assert!(robots.is_allowed("sitecrawl", "/private/open/doc"));
    assert!(robots.is_allowed("sitecrawl", "/public/private-ish"));
}

#[tokio::test]
async fn test_consecutive_429s_escalate_then_recover() {
    let config = RateLimitConfig {
        default_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        ..Default::default()
    };
    let limiter = RateLimiter::with_config(config.clone());
    let domain = "example.com";
    let _slot = limiter.acquire("https://example.com/").await.unwrap();

    let mut delays = vec![limiter.current_delay(domain).await.unwrap()];
    for _ in 0..8 {
        limiter.report_rate_limit(domain, 429).await;
        delays.push(limiter.current_delay(domain).await.unwrap());
    }

    let capped_at = delays
        .iter()
        .position(|d| *d == config.max_delay)
        .expect("delay reaches the cap");
    for pair in delays[..=capped_at].windows(2) {
        assert!(pair[1] > pair[0], "{:?} should grow", pair);
    }
    assert!(delays[capped_at..].iter().all(|d| *d == config.max_delay));

    let mut previous = config.max_delay;
    for _ in 0..60 {
        limiter.report_success(domain).await;
        let current = limiter.current_delay(domain).await.unwrap();
        assert!(current >= config.default_delay);
        if previous > config.default_delay {
            assert!(current < previous);
        }
        previous = current;
    }
    assert_eq!(previous, config.default_delay);
}

#[tokio::test]
async fn test_429_backs_off_domain_and_reports_rate_limited() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(429);
        })
        .await;

    let crawler = Crawler::new(quiet_config()).unwrap();
    let mut rx = crawler.subscribe();
    let summary = crawler.run(&[server.url("/")]).await.unwrap();

    assert_eq!(summary.status, CrawlStatus::Failed);
    let mut category = None;
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::PageFailed { category: c, .. } = event {
            category = Some(c);
        }
    }
    assert_eq!(category, Some(ErrorCategory::RateLimited));

    let domain = RateLimiter::extract_domain(&server.url("/")).unwrap();
    let delay = crawler
        .client()
        .rate_limiter()
        .current_delay(&domain)
        .await
        .unwrap();
    assert!(delay > Duration::ZERO);
}

#[tokio::test]
async fn test_robots_crawl_delay_raises_domain_floor() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(200)
                .body("User-agent: *\nCrawl-delay: 2\nSitemap: /sitemap.xml\n");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html><body>hi</body></html>");
        })
        .await;

    let crawler = Crawler::new(quiet_config()).unwrap();
    let summary = crawler.run(&[server.url("/")]).await.unwrap();
    assert_eq!(summary.progress.scraped, 1);

    let domain = RateLimiter::extract_domain(&server.url("/")).unwrap();
    let stats = crawler.client().rate_limiter().get_stats().await;
    assert_eq!(stats[&domain].floor_delay, Duration::from_secs(2));
}

#[tokio::test]
async fn test_ignoring_robots_skips_robots_fetch() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(200).body("User-agent: *\nDisallow: /\n");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html><body>open</body></html>");
        })
        .await;

    let blocked = Crawler::new(quiet_config()).unwrap();
    let summary = blocked.run(&[server.url("/")]).await.unwrap();
    assert_eq!(summary.progress.scraped, 0);
    assert_eq!(summary.progress.skipped, 1);

    let config = CrawlConfig {
        respect_robots_txt: false,
        ..quiet_config()
    };
    let open = Crawler::new(config).unwrap();
    let summary = open.run(&[server.url("/")]).await.unwrap();
    assert_eq!(summary.progress.scraped, 1);
}
