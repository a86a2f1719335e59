//! Crawl orchestrator.
//!
//! The run loop owns the frontier and the visited set. Page work runs in a
//! `JoinSet` bounded by a semaphore of `max_concurrent_requests` permits and
//! reports back to the loop, which alone decides what gets queued next.
//! Everything else learns about the crawl from [`CrawlEvent`]s.

pub mod control;
pub mod events;
pub mod filters;
pub mod frontier;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::CrawlConfig;
use crate::error::{CrawlError, ErrorCategory, FetchError, RenderError};
use crate::extract::{analyze, RuleExtractor};
use crate::models::{
    CrawlProgress, CrawlStatus, DownloadedFile, DuplicateGroup, PageResources, ProcessingStatus,
    QueuedUrl, ScrapedPage,
};
use crate::scrapers::{HttpClient, PageRenderer, Politeness, RateLimiter};
use crate::services::dedup::DuplicateDetector;
use crate::services::download::{DownloadFailure, DownloadOutcome, DownloadRequest, Downloader};
use crate::storage::sha256_hex;
use crate::utils::url::{classify, normalize};
use crate::utils::FileCategory;

pub use control::CrawlControl;
pub use events::{CrawlEvent, EventSender, SkipReason, EMIT_YIELD_EVERY, EVENT_CAPACITY};
pub use filters::{Scope, UrlFilter};
pub use frontier::Frontier;

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub status: CrawlStatus,
    pub progress: CrawlProgress,
    pub config_hash: String,
    /// Out-of-scope links seen during the run, in discovery order.
    pub external_links: Vec<String>,
    pub files: Vec<DownloadedFile>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub download_failures: Vec<DownloadFailure>,
    pub elapsed: Duration,
}

/// Cloneable remote control for a crawler, usable while `run` is awaited.
#[derive(Debug, Clone)]
pub struct CrawlHandle {
    control: CrawlControl,
    progress: Arc<RwLock<CrawlProgress>>,
}

impl CrawlHandle {
    /// Stop dequeuing. In-flight pages finish.
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Request a cooperative stop, checked at the top of each loop iteration.
    pub fn stop(&self) {
        self.control.stop();
    }

    pub async fn progress(&self) -> CrawlProgress {
        self.progress.read().await.clone()
    }

    pub async fn status(&self) -> CrawlStatus {
        self.progress.read().await.status
    }
}

pub struct Crawler {
    config: CrawlConfig,
    events: EventSender,
    control: CrawlControl,
    progress: Arc<RwLock<CrawlProgress>>,
    client: HttpClient,
    politeness: Politeness,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let (client, politeness) = build_network(&config)?;
        Ok(Self {
            config,
            events: EventSender::new(),
            control: CrawlControl::new(),
            progress: Arc::new(RwLock::new(CrawlProgress::new())),
            client,
            politeness,
            renderer: None,
        })
    }

    /// Use `renderer` for pages when `enable_javascript` is set.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// The HTTP client pages and downloads go through.
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle {
            control: self.control.clone(),
            progress: Arc::clone(&self.progress),
        }
    }

    pub async fn progress(&self) -> CrawlProgress {
        self.progress.read().await.clone()
    }

    /// Swap the configuration between runs.
    ///
    /// The HTTP client is rebuilt; session cookies carry over.
    pub async fn set_config(&mut self, config: CrawlConfig) -> Result<(), CrawlError> {
        let status = self.progress.read().await.status;
        if status.is_active() {
            return Err(CrawlError::ReconfigureWhileActive(status.to_string()));
        }
        config.validate()?;

        let (client, politeness) = build_network(&config)?;
        client.import_cookies(self.client.export_cookies().await).await;
        self.client = client;
        self.politeness = politeness;
        self.config = config;
        Ok(())
    }

    /// Crawl from `seeds` until the frontier drains, `max_pages` is reached
    /// or a stop is requested.
    ///
    /// Page failures are counted, not returned; the run only ends `Failed`
    /// when every attempted page errored.
    pub async fn run(&self, seeds: &[String]) -> Result<CrawlSummary, CrawlError> {
        let seeds = validate_seeds(seeds)?;
        let started = Instant::now();

        let previous = {
            let mut progress = self.progress.write().await;
            if progress.status.is_active() {
                return Err(CrawlError::AlreadyRunning);
            }
            let previous = progress.status;
            *progress = CrawlProgress::new();
            progress.status = CrawlStatus::Initializing;
            progress.started_at = Some(Utc::now());
            previous
        };
        self.events.emit(CrawlEvent::StatusChanged {
            from: previous,
            to: CrawlStatus::Initializing,
        });

        self.control.reset();
        let config = self.config.clone();
        let config_hash = config.hash();
        info!(
            "Starting crawl of {} seed(s), max depth {}, max pages {} (config {})",
            seeds.len(),
            config.max_depth,
            config.max_pages,
            &config_hash[..12]
        );
        self.events.emit(CrawlEvent::Started {
            seeds: seeds.clone(),
            config_hash: config_hash.clone(),
        });

        let client = self.client.clone().with_cancellation(self.control.stop_flag());
        let downloader = (!config.download_file_types.is_empty())
            .then(|| Downloader::spawn(client.clone(), config.download.clone()));

        let scope = Scope::new(seeds.iter().map(String::as_str), config.follow_external_links);
        let renderer = match (&self.renderer, config.enable_javascript) {
            (Some(renderer), true) => Some(Arc::clone(renderer)),
            (None, true) => {
                warn!("JavaScript rendering enabled but no renderer configured; using HTTP");
                None
            }
            _ => None,
        };
        let context = Arc::new(PageContext {
            client,
            politeness: self.politeness.clone(),
            renderer,
            extractor: RuleExtractor::new(&config.extraction_rules),
            scope: scope.clone(),
        });

        let mut run = RunState {
            frontier: frontier::Frontier::new(config.strategy),
            visited: HashSet::new(),
            discovered: HashSet::new(),
            external_seen: HashSet::new(),
            external_links: Vec::new(),
            files_seen: HashSet::new(),
            filter: UrlFilter::new(&config.url_whitelist, &config.url_blacklist),
            scope,
            downloads: downloader,
            dedup: DuplicateDetector::new(),
            files: Vec::new(),
            download_failures: Vec::new(),
            scraped: 0,
            errors: 0,
        };

        for seed in &seeds {
            if let Some(key) = normalize(seed) {
                run.discovered.insert(key);
            }
            let queued = run.frontier.push(QueuedUrl::seed(seed.clone()));
            self.events.emit(CrawlEvent::UrlDiscovered {
                url: seed.clone(),
                parent_url: None,
                depth: 0,
                category: FileCategory::Page,
                queued,
                external: false,
            });
        }
        let discovered = run.discovered.len() as u64;
        let queued = run.frontier.len() as u64;
        self.update(|p| {
            p.discovered = discovered;
            p.queued = queued;
        })
        .await;

        self.transition(CrawlStatus::Running).await;
        self.crawl_loop(&config, &context, &mut run).await;

        let (files, duplicate_groups, download_failures) = self.collect_downloads(&mut run).await;

        let final_status = if run.scraped == 0 && run.errors > 0 {
            CrawlStatus::Failed
        } else {
            CrawlStatus::Completed
        };
        self.transition(final_status).await;

        let progress = self.progress().await;
        let elapsed = started.elapsed();
        info!(
            "Crawl {}: {} scraped, {} errors, {} skipped, {} files in {:.1}s",
            final_status,
            progress.scraped,
            progress.errors,
            progress.skipped,
            progress.files,
            elapsed.as_secs_f64()
        );
        self.events.emit(CrawlEvent::Completed(progress.clone()));

        Ok(CrawlSummary {
            status: final_status,
            progress,
            config_hash,
            external_links: run.external_links,
            files,
            duplicate_groups,
            download_failures,
            elapsed,
        })
    }

    async fn crawl_loop(&self, config: &CrawlConfig, context: &Arc<PageContext>, run: &mut RunState) {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        let mut tasks: JoinSet<PageOutcome> = JoinSet::new();

        loop {
            if self.control.is_stopped() {
                self.transition(CrawlStatus::Stopping).await;
                break;
            }

            if self.control.is_paused() {
                self.transition(CrawlStatus::Paused).await;
                match tasks.join_next().await {
                    Some(done) => self.handle_outcome(config, run, done).await,
                    None => self.control.wait_while_paused().await,
                }
                continue;
            }
            self.transition(CrawlStatus::Running).await;

            while !config.max_pages_reached(run.scraped + tasks.len() as u64) {
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                let Some(item) = run.frontier.pop() else {
                    break;
                };

                if item.depth > config.max_depth {
                    self.skip(item, SkipReason::TooDeep).await;
                    continue;
                }
                let Some(key) = normalize(&item.url) else {
                    continue;
                };
                if !run.visited.insert(key) {
                    continue;
                }

                let queued = run.frontier.len() as u64;
                self.update(|p| {
                    p.processed += 1;
                    p.queued = queued;
                })
                .await;
                tasks.spawn(process_page(Arc::clone(context), item, permit));
            }

            match tasks.join_next().await {
                Some(done) => self.handle_outcome(config, run, done).await,
                None => break,
            }
        }

        // Stopping: in-flight pages finish (or cancel at their next retry
        // boundary) and are still recorded.
        while let Some(done) = tasks.join_next().await {
            self.handle_outcome(config, run, done).await;
        }
    }

    async fn handle_outcome(
        &self,
        config: &CrawlConfig,
        run: &mut RunState,
        done: Result<PageOutcome, JoinError>,
    ) {
        self.drain_downloads(run);

        let outcome = match done {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Page task panicked: {}", e);
                run.errors += 1;
                self.update(|p| p.errors += 1).await;
                return;
            }
        };

        match outcome {
            PageOutcome::Scraped(page) => self.record_page(config, run, page).await,
            PageOutcome::Skipped { item, reason } => self.skip(item, reason).await,
            PageOutcome::Failed {
                item,
                error,
                category,
                status,
            } => {
                run.errors += 1;
                match category {
                    ErrorCategory::AuthRequired => {
                        warn!("{} requires authentication: {}", item.url, error)
                    }
                    ErrorCategory::Permanent => debug!("Skipping {}: {}", item.url, error),
                    _ => warn!("Failed to crawl {}: {}", item.url, error),
                }
                self.update(|p| p.errors += 1).await;
                self.events.emit(CrawlEvent::PageFailed {
                    url: item.url,
                    parent_url: item.parent_url,
                    depth: item.depth,
                    error,
                    category,
                    status,
                });
            }
            PageOutcome::Cancelled(item) => debug!("Cancelled {}", item.url),
        }

        let progress = self.update(|p| p.queued = run.frontier.len() as u64).await;
        if progress.processed > 0 && progress.processed % 100 == 0 {
            info!(
                "Processed {} pages ({} scraped, {} queued, {} errors)",
                progress.processed, progress.scraped, progress.queued, progress.errors
            );
        }
        self.events.emit(CrawlEvent::Progress(progress));
    }

    async fn record_page(&self, config: &CrawlConfig, run: &mut RunState, page: Arc<ScrapedPage>) {
        run.scraped += 1;
        if let Some(key) = normalize(&page.final_url) {
            run.visited.insert(key);
        }
        self.update(|p| p.scraped += 1).await;
        self.events.emit(CrawlEvent::PageScraped(Arc::clone(&page)));

        let child_depth = page.depth + 1;
        let mut emitted = 0usize;
        let mut discovered = 0u64;
        let mut skipped = 0u64;

        for link in &page.links {
            if run.visited.contains(link) || run.frontier.contains(link) {
                continue;
            }
            let first_sighting = run.discovered.insert(link.clone());

            let queued = if !run.filter.allows(link) {
                if first_sighting {
                    skipped += 1;
                    self.events.emit(CrawlEvent::PageSkipped {
                        url: link.clone(),
                        parent_url: Some(page.url.clone()),
                        depth: child_depth,
                        reason: SkipReason::Filtered,
                    });
                    pace(&mut emitted).await;
                }
                false
            } else if child_depth > config.max_depth {
                false
            } else {
                run.frontier.push(QueuedUrl::new(
                    link.clone(),
                    child_depth,
                    Some(page.url.clone()),
                ))
            };

            if first_sighting {
                discovered += 1;
                self.events.emit(CrawlEvent::UrlDiscovered {
                    url: link.clone(),
                    parent_url: Some(page.url.clone()),
                    depth: child_depth,
                    category: FileCategory::Page,
                    queued,
                    external: !run.scope.is_internal(link),
                });
                pace(&mut emitted).await;
            }
        }

        for link in &page.external_links {
            if !run.external_seen.insert(link.clone()) {
                continue;
            }
            run.external_links.push(link.clone());
            if run.discovered.insert(link.clone()) {
                discovered += 1;
                self.events.emit(CrawlEvent::UrlDiscovered {
                    url: link.clone(),
                    parent_url: Some(page.url.clone()),
                    depth: child_depth,
                    category: FileCategory::Page,
                    queued: false,
                    external: true,
                });
                pace(&mut emitted).await;
            }
        }

        let mut files = 0u64;
        let resources = page
            .resources
            .files
            .iter()
            .map(|url| (url, classify(url, None).unwrap_or(FileCategory::Other)))
            .chain(page.resources.images.iter().map(|url| {
                let category = classify(url, None)
                    .filter(FileCategory::is_file)
                    .unwrap_or(FileCategory::Image);
                (url, category)
            }));
        for (url, category) in resources {
            if !run.files_seen.insert(url.clone()) {
                continue;
            }
            files += 1;
            self.events.emit(CrawlEvent::FileDiscovered {
                url: url.clone(),
                parent_url: page.url.clone(),
                category,
            });
            pace(&mut emitted).await;

            if let Some(downloader) = run.downloads.as_ref() {
                if config.should_download(url, category) {
                    if let Err(e) = downloader
                        .enqueue(DownloadRequest::new(url, Some(&page.url)))
                        .await
                    {
                        warn!("Could not queue download of {}: {}", url, e);
                    }
                }
            }
        }

        self.update(|p| {
            p.discovered += discovered;
            p.skipped += skipped;
            p.files += files;
        })
        .await;
    }

    async fn skip(&self, item: QueuedUrl, reason: SkipReason) {
        debug!("Skipping {} ({:?})", item.url, reason);
        self.update(|p| p.skipped += 1).await;
        self.events.emit(CrawlEvent::PageSkipped {
            url: item.url,
            parent_url: item.parent_url,
            depth: item.depth,
            reason,
        });
    }

    /// Announce downloads that finished since the last check.
    fn drain_downloads(&self, run: &mut RunState) {
        while let Some(outcome) = run.downloads.as_mut().and_then(Downloader::try_next) {
            self.record_download(run, outcome);
        }
    }

    fn record_download(&self, run: &mut RunState, outcome: DownloadOutcome) {
        match outcome {
            Ok(mut file) => {
                run.dedup.register_file(&mut file);
                self.events
                    .emit(CrawlEvent::FileDownloaded(Arc::new(file.clone())));
                run.files.push(file);
            }
            Err(failure) => run.download_failures.push(failure),
        }
    }

    /// Wait for the remaining transfers, then settle duplicate groups.
    async fn collect_downloads(
        &self,
        run: &mut RunState,
    ) -> (Vec<DownloadedFile>, Vec<DuplicateGroup>, Vec<DownloadFailure>) {
        if let Some(downloader) = run.downloads.take() {
            for outcome in downloader.finish().await {
                self.record_download(run, outcome);
            }
        }

        let mut files = std::mem::take(&mut run.files);
        // Files registered before their group formed still need the group id.
        for file in &mut files {
            if let Some(group) = run.dedup.group_for_file(&file.id) {
                file.duplicate_group_id = Some(group.id.clone());
            }
        }

        let stats = run.dedup.stats();
        if stats.groups > 0 {
            info!(
                "{} duplicate file(s) in {} group(s), {} bytes wasted",
                stats.duplicate_files, stats.groups, stats.wasted_bytes
            );
        }
        let groups = run.dedup.groups().into_iter().cloned().collect();
        (files, groups, std::mem::take(&mut run.download_failures))
    }

    async fn update<F>(&self, f: F) -> CrawlProgress
    where
        F: FnOnce(&mut CrawlProgress),
    {
        let mut progress = self.progress.write().await;
        f(&mut progress);
        progress.clone()
    }

    /// Move to `to` if the lifecycle allows it. Same-state moves are no-ops.
    async fn transition(&self, to: CrawlStatus) -> bool {
        let from = {
            let mut progress = self.progress.write().await;
            let from = progress.status;
            if from == to {
                return true;
            }
            if !from.can_transition_to(to) {
                warn!("Ignoring illegal crawl transition {} -> {}", from, to);
                return false;
            }
            progress.status = to;
            if to.is_terminal() {
                progress.finished_at = Some(Utc::now());
            }
            from
        };
        debug!("Crawl status {} -> {}", from, to);
        self.events.emit(CrawlEvent::StatusChanged { from, to });
        true
    }
}

/// Let subscribers drain the channel during long bursts of events.
async fn pace(emitted: &mut usize) {
    *emitted += 1;
    if *emitted % EMIT_YIELD_EVERY == 0 {
        tokio::task::yield_now().await;
    }
}

fn build_network(config: &CrawlConfig) -> Result<(HttpClient, Politeness), CrawlError> {
    let limiter = RateLimiter::with_config(config.rate_limit_config());
    let client = HttpClient::with_rate_limiter(config.fetch_options(), limiter.clone())
        .map_err(|e| CrawlError::Client(e.to_string()))?;
    let politeness = Politeness::new(
        limiter,
        client.user_agent(),
        config.respect_robots_txt,
        Duration::from_secs(config.request_timeout_secs),
    )
    .map_err(|e| CrawlError::Client(e.to_string()))?;
    Ok((client, politeness))
}

fn validate_seeds(seeds: &[String]) -> Result<Vec<String>, CrawlError> {
    if seeds.is_empty() {
        return Err(CrawlError::InvalidSeed("no seed URLs given".to_string()));
    }
    let mut unique = Vec::new();
    let mut seen = HashSet::new();
    for seed in seeds {
        let parsed = url::Url::parse(seed.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| CrawlError::InvalidSeed(seed.clone()))?;
        let key = normalize(parsed.as_str()).ok_or_else(|| CrawlError::InvalidSeed(seed.clone()))?;
        if seen.insert(key) {
            unique.push(parsed.to_string());
        }
    }
    Ok(unique)
}

/// Loop-owned bookkeeping for one run.
struct RunState {
    frontier: Frontier,
    /// Normalized URLs already dequeued (or reached through a redirect).
    visited: HashSet<String>,
    /// Normalized URLs ever announced through `UrlDiscovered`.
    discovered: HashSet<String>,
    external_seen: HashSet<String>,
    external_links: Vec<String>,
    files_seen: HashSet<String>,
    filter: UrlFilter,
    scope: Scope,
    downloads: Option<Downloader>,
    dedup: DuplicateDetector,
    files: Vec<DownloadedFile>,
    download_failures: Vec<DownloadFailure>,
    scraped: u64,
    errors: u64,
}

/// Read-only inputs shared by page tasks.
struct PageContext {
    client: HttpClient,
    politeness: Politeness,
    renderer: Option<Arc<dyn PageRenderer>>,
    extractor: RuleExtractor,
    scope: Scope,
}

enum PageOutcome {
    Scraped(Arc<ScrapedPage>),
    Skipped {
        item: QueuedUrl,
        reason: SkipReason,
    },
    Failed {
        item: QueuedUrl,
        error: String,
        category: ErrorCategory,
        status: Option<u16>,
    },
    Cancelled(QueuedUrl),
}

/// Markup and response details, from HTTP or the renderer.
struct FetchedPage {
    final_url: String,
    status: u16,
    html: String,
    redirect_chain: Vec<String>,
    response_time: Duration,
    rendered: bool,
}

enum PageError {
    Fetch(FetchError),
    Render(RenderError),
}

async fn process_page(
    context: Arc<PageContext>,
    item: QueuedUrl,
    _permit: OwnedSemaphorePermit,
) -> PageOutcome {
    if !context.politeness.allows(&item.url).await {
        return PageOutcome::Skipped {
            item,
            reason: SkipReason::Robots,
        };
    }

    let fetched = match context.renderer.as_ref() {
        Some(renderer) => render_page(&context, renderer.as_ref(), &item.url).await,
        None => fetch_page(&context.client, &item.url).await,
    };
    let fetched = match fetched {
        Ok(Some(fetched)) => fetched,
        Ok(None) => {
            return PageOutcome::Skipped {
                item,
                reason: SkipReason::NotHtml,
            }
        }
        Err(PageError::Fetch(FetchError::Cancelled(_))) => return PageOutcome::Cancelled(item),
        Err(PageError::Fetch(e)) => {
            return PageOutcome::Failed {
                error: e.to_string(),
                category: e.category(),
                status: e.status(),
                item,
            }
        }
        Err(PageError::Render(e)) => {
            let category = match e {
                RenderError::Timeout(_) => ErrorCategory::Transient,
                _ => ErrorCategory::Unknown,
            };
            return PageOutcome::Failed {
                error: e.to_string(),
                category,
                status: None,
                item,
            };
        }
    };

    PageOutcome::Scraped(Arc::new(build_page(&context, item, fetched)))
}

/// Fetch over HTTP. `Ok(None)` means the response was not HTML.
async fn fetch_page(client: &HttpClient, url: &str) -> Result<Option<FetchedPage>, PageError> {
    let response = client.fetch(url).await.map_err(PageError::Fetch)?;
    if !response.is_html() {
        debug!(
            "{} is not HTML ({})",
            response.final_url,
            response.content_type().unwrap_or("no content type")
        );
        return Ok(None);
    }

    let html = match response.text {
        Some(text) => text,
        None => String::from_utf8_lossy(&response.body).into_owned(),
    };
    Ok(Some(FetchedPage {
        final_url: response.final_url,
        status: response.status,
        html,
        redirect_chain: response.redirect_chain,
        response_time: response.response_time,
        rendered: false,
    }))
}

async fn render_page(
    context: &PageContext,
    renderer: &dyn PageRenderer,
    url: &str,
) -> Result<Option<FetchedPage>, PageError> {
    let started = Instant::now();
    // Hold a rate slot for the whole render; the browser makes the request.
    let _slot = context.politeness.rate_limiter().acquire(url).await;
    debug!("Rendering {} with {}", url, renderer.name());
    let page = renderer.render(url).await.map_err(PageError::Render)?;

    let final_url = if page.final_url.is_empty() {
        url.to_string()
    } else {
        page.final_url
    };
    let redirect_chain = if final_url != url {
        vec![url.to_string()]
    } else {
        Vec::new()
    };
    Ok(Some(FetchedPage {
        final_url,
        status: 200,
        html: page.html_content,
        redirect_chain,
        response_time: started.elapsed(),
        rendered: true,
    }))
}

/// Parse, extract and split links into followable, external and files.
///
/// Links are judged against the final URL's scope: a page reached through
/// a redirect out of scope contributes only external links.
fn build_page(context: &PageContext, item: QueuedUrl, fetched: FetchedPage) -> ScrapedPage {
    let analysis = analyze(&fetched.html, &fetched.final_url, &context.extractor);
    let follow_links = context.scope.follows(&fetched.final_url);
    if !follow_links {
        debug!(
            "{} redirected out of scope to {}; links not followed",
            item.url, fetched.final_url
        );
    }

    let mut links = Vec::new();
    let mut external_links = Vec::new();
    let mut files = Vec::new();
    for link in analysis.links {
        let Some(normalized) = normalize(&link) else {
            continue;
        };
        match classify(&normalized, None) {
            Some(category) if category.is_file() => files.push(normalized),
            _ if follow_links && context.scope.follows(&normalized) => links.push(normalized),
            _ => external_links.push(normalized),
        }
    }

    let normalize_all =
        |urls: Vec<String>| -> Vec<String> { urls.iter().filter_map(|u| normalize(u)).collect() };

    ScrapedPage {
        id: uuid::Uuid::new_v4().to_string(),
        content_hash: sha256_hex(analysis.text.as_bytes()),
        url: item.url,
        final_url: fetched.final_url,
        parent_url: item.parent_url,
        status_code: fetched.status,
        content: fetched.html,
        text: analysis.text,
        title: analysis.title,
        metadata: analysis.metadata,
        depth: item.depth,
        links,
        external_links,
        resources: PageResources {
            images: normalize_all(analysis.images),
            scripts: normalize_all(analysis.scripts),
            stylesheets: normalize_all(analysis.stylesheets),
            files,
        },
        extraction: analysis.extraction,
        processing_status: ProcessingStatus::Complete,
        redirect_chain: fetched.redirect_chain,
        response_time_ms: fetched.response_time.as_millis() as u64,
        rendered: fetched.rendered,
        fetched_at: Utc::now(),
    }
}
