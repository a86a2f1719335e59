//! Robots.txt inspection command.

use std::time::Duration;

use console::style;
use url::Url;

use crate::config::CrawlConfig;
use crate::scrapers::http_client::resolve_user_agent;
use crate::scrapers::robots::{fetch_robots_txt, robots_origin};

pub async fn cmd_robots(
    config: &CrawlConfig,
    url: &str,
    user_agent: Option<&str>,
) -> anyhow::Result<()> {
    let parsed = Url::parse(url)?;
    let origin = robots_origin(&parsed)
        .ok_or_else(|| anyhow::anyhow!("{} has no host", url))?;
    let agent = resolve_user_agent(user_agent.or(config.user_agent.as_deref()));

    let client = reqwest::Client::builder()
        .user_agent(&agent)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    let robots = fetch_robots_txt(&client, &origin).await?;

    if robots.is_url_allowed(&agent, &parsed) {
        println!("{} {} is allowed for {}", style("✓").green(), url, agent);
    } else {
        println!("{} {} is disallowed for {}", style("✗").red(), url, agent);
    }
    if robots.disallows_all(&agent) {
        println!("  {} the whole site is disallowed", style("!").yellow());
    }
    if let Some(delay) = robots.crawl_delay(&agent) {
        println!("  Crawl-delay: {:.1}s", delay.as_secs_f64());
    }
    for sitemap in robots.sitemaps() {
        println!("  Sitemap: {}", sitemap);
    }
    Ok(())
}
