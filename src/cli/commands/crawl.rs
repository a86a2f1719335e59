//! Crawl command.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{error::RecvError, Receiver};

use crate::config::{CrawlConfig, CrawlStrategy};
use crate::crawler::{CrawlEvent, Crawler};
use crate::models::CrawlStatus;
use crate::services::{ChangeDetector, SiteGraph};

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Seed URLs
    #[arg(required = true)]
    seeds: Vec<String>,

    /// Maximum link depth from the seeds
    #[arg(long)]
    max_depth: Option<u32>,

    /// Stop after this many scraped pages (0 = unlimited)
    #[arg(long)]
    max_pages: Option<usize>,

    /// Use a LIFO frontier instead of breadth-first
    #[arg(long)]
    depth_first: bool,

    /// Follow links outside the seeds' domains
    #[arg(long)]
    external: bool,

    /// Do not fetch or honour robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Starting delay between requests to one domain
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Download linked files of these types (e.g. pdf, image, csv)
    #[arg(long = "download", value_delimiter = ',')]
    download_types: Vec<String>,

    /// Directory for downloaded files
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Write scraped pages as JSON lines
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl CrawlArgs {
    fn apply(&self, config: &mut CrawlConfig) {
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = pages;
        }
        if self.depth_first {
            config.strategy = CrawlStrategy::DepthFirst;
        }
        if self.external {
            config.follow_external_links = true;
        }
        if self.ignore_robots {
            config.respect_robots_txt = false;
        }
        if let Some(delay) = self.delay_ms {
            config.request_delay_ms = delay;
        }
        if !self.download_types.is_empty() {
            config.download_file_types = self.download_types.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.download.directory = dir.clone();
        }
    }
}

pub async fn cmd_crawl(mut config: CrawlConfig, args: CrawlArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let max_pages = config.max_pages;
    let change_config = config.change_detection.clone();
    let crawler = Crawler::new(config)?;

    let graph_task = tokio::spawn(SiteGraph::new().observe(crawler.subscribe()));
    let changes_task = tokio::spawn(ChangeDetector::new(&change_config).observe(crawler.subscribe()));

    let output = match &args.output {
        Some(path) => Some(tokio::fs::File::create(path).await?),
        None => None,
    };
    let progress_task = tokio::spawn(show_progress(crawler.subscribe(), max_pages, output));

    let handle = crawler.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Stopping after in-flight requests...", style("!").yellow());
            handle.stop();
        }
    });

    println!(
        "{} Crawling {} seed{}",
        style("→").cyan(),
        args.seeds.len(),
        if args.seeds.len() == 1 { "" } else { "s" }
    );
    let summary = crawler.run(&args.seeds).await?;
    let written = progress_task.await??;
    let graph = graph_task.await?;
    let changes = changes_task.await?;

    let marker = match summary.status {
        CrawlStatus::Completed => style("✓").green(),
        _ => style("✗").red(),
    };
    let p = &summary.progress;
    println!(
        "{} Crawl {} in {:.1}s",
        marker,
        summary.status,
        summary.elapsed.as_secs_f64()
    );
    println!(
        "  {} scraped, {} processed, {} errors, {} skipped, {} discovered",
        p.scraped, p.processed, p.errors, p.skipped, p.discovered
    );

    let stats = graph.stats();
    println!(
        "  Site graph: {} nodes, max depth {}, {} broken, {} external, {} blocked",
        stats.total_nodes, stats.max_depth, stats.broken, stats.external, stats.blocked
    );
    if !summary.external_links.is_empty() {
        println!(
            "  {} external link{} recorded (not followed)",
            summary.external_links.len(),
            if summary.external_links.len() == 1 { "" } else { "s" }
        );
    }

    if !summary.files.is_empty() || !summary.download_failures.is_empty() {
        println!(
            "  {} files downloaded, {} failed",
            summary.files.len(),
            summary.download_failures.len()
        );
        for group in &summary.duplicate_groups {
            println!(
                "    {} {} copies of {} ({} bytes wasted)",
                style("≡").dim(),
                group.members.len(),
                &group.hash[..12],
                group.wasted_bytes()
            );
        }
    }
    for alert in changes.alerts() {
        println!(
            "  {} {} changed ({} trigger{})",
            style("!").yellow(),
            alert.page_url,
            alert.triggers.len(),
            if alert.triggers.len() == 1 { "" } else { "s" }
        );
    }
    if let Some(path) = &args.output {
        println!("  {} pages written to {}", written, path.display());
    }

    Ok(())
}

/// Render progress until the crawl completes; returns pages written to `output`.
async fn show_progress(
    mut rx: Receiver<CrawlEvent>,
    max_pages: usize,
    mut output: Option<tokio::fs::File>,
) -> anyhow::Result<u64> {
    let pb = if max_pages > 0 {
        let pb = ProgressBar::new(max_pages as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")?
                .progress_chars("█▓░"),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {pos} pages {wide_msg}")?);
        pb
    };
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut written = 0u64;
    loop {
        match rx.recv().await {
            Ok(CrawlEvent::Progress(p)) => {
                pb.set_position(p.scraped);
                pb.set_message(format!(
                    "{} queued, {} errors, {} files",
                    p.queued, p.errors, p.files
                ));
            }
            Ok(CrawlEvent::PageScraped(page)) => {
                if let Some(file) = output.as_mut() {
                    let mut line = serde_json::to_vec(page.as_ref())?;
                    line.push(b'\n');
                    file.write_all(&line).await?;
                    written += 1;
                }
            }
            Ok(CrawlEvent::PageFailed { url, error, .. }) => {
                pb.println(format!("{} {}: {}", style("✗").red(), url, error));
            }
            Ok(CrawlEvent::StatusChanged { to, .. }) if to == CrawlStatus::Stopping => {
                pb.set_message("stopping...");
            }
            Ok(CrawlEvent::Completed(_)) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                tracing::debug!("Progress display skipped {} events", n);
            }
            Err(RecvError::Closed) => break,
        }
    }

    pb.finish_and_clear();
    if let Some(mut file) = output {
        file.flush().await?;
    }
    Ok(written)
}
