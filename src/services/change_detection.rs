//! Content snapshots, line diffs and watch rules.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Write};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, info, warn};

use crate::config::ChangeDetectionConfig;
use crate::crawler::CrawlEvent;
use crate::models::{ContentDiff, Snapshot, WatchAlert, WatchRule, WatchTrigger};
use crate::storage::sha256_hex;
use crate::utils::url::normalize;

/// Trim every line and drop blank ones.
pub fn normalize_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Capture `text` for `page_url`: normalized, hashed and gzipped.
pub fn create_snapshot(page_url: &str, text: &str) -> Snapshot {
    let text_content = normalize_text(text);
    let compressed_content = match compress(&text_content) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to compress snapshot of {}: {}", page_url, e);
            Vec::new()
        }
    };
    Snapshot {
        id: uuid::Uuid::new_v4().to_string(),
        page_url: page_url.to_string(),
        captured_at: Utc::now(),
        content_hash: sha256_hex(text_content.as_bytes()),
        text_content,
        compressed_content,
    }
}

fn compress(text: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    encoder.finish()
}

/// Recover the text stored in `compressed_content`.
pub fn decompress(snapshot: &Snapshot) -> std::io::Result<String> {
    let mut text = String::new();
    GzDecoder::new(snapshot.compressed_content.as_slice()).read_to_string(&mut text)?;
    Ok(text)
}

/// Line-level diff between two snapshots.
///
/// Equal hashes short-circuit to no changes. Otherwise lines only in `new`
/// are added, lines only in `old` are removed, and differing lines at the
/// same position are modified. The percentage counts differing positions
/// against the longer of the two texts.
pub fn diff(old: &Snapshot, new: &Snapshot) -> ContentDiff {
    if old.content_hash == new.content_hash {
        return ContentDiff::unchanged();
    }

    let old_lines: Vec<&str> = old.text_content.lines().collect();
    let new_lines: Vec<&str> = new.text_content.lines().collect();
    let old_set: HashSet<&str> = old_lines.iter().copied().collect();
    let new_set: HashSet<&str> = new_lines.iter().copied().collect();

    let added: Vec<String> = new_lines
        .iter()
        .filter(|line| !old_set.contains(*line))
        .map(|line| line.to_string())
        .collect();
    let removed: Vec<String> = old_lines
        .iter()
        .filter(|line| !new_set.contains(*line))
        .map(|line| line.to_string())
        .collect();
    let modified: Vec<(String, String)> = old_lines
        .iter()
        .zip(&new_lines)
        .filter(|(a, b)| a != b)
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();

    let longest = old_lines.len().max(new_lines.len());
    let changed = (0..longest)
        .filter(|&i| old_lines.get(i) != new_lines.get(i))
        .count();
    let change_percentage = if longest == 0 {
        0.0
    } else {
        changed as f64 / longest as f64 * 100.0
    };

    ContentDiff {
        has_changes: !added.is_empty() || !removed.is_empty() || !modified.is_empty(),
        added,
        removed,
        modified,
        change_percentage,
    }
}

/// Which watch-rule triggers fire for a new snapshot.
///
/// Keywords match case-insensitively and must be absent from the prior text.
pub fn evaluate_rule(
    rule: &WatchRule,
    previous: &Snapshot,
    current: &Snapshot,
    diff: &ContentDiff,
) -> Vec<WatchTrigger> {
    let before = previous.text_content.to_lowercase();
    let after = current.text_content.to_lowercase();

    let mut triggers: Vec<WatchTrigger> = rule
        .keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .filter(|k| {
            let k = k.to_lowercase();
            after.contains(&k) && !before.contains(&k)
        })
        .map(|k| WatchTrigger::KeywordAppeared {
            keyword: k.clone(),
        })
        .collect();

    if let Some(threshold) = rule.change_threshold {
        if diff.has_changes && diff.change_percentage >= threshold {
            triggers.push(WatchTrigger::ThresholdExceeded {
                change_percentage: diff.change_percentage,
                threshold,
            });
        }
    }
    triggers
}

/// Outcome of recording one snapshot.
#[derive(Debug, Clone)]
pub struct Capture {
    pub snapshot: Snapshot,
    /// Diff against the previous snapshot of the page, if there was one.
    pub diff: Option<ContentDiff>,
    pub alerts: Vec<WatchAlert>,
}

/// Per-page snapshot history and the watch rules evaluated against it.
#[derive(Debug)]
pub struct ChangeDetector {
    retention: usize,
    alert_retention: usize,
    history: HashMap<String, VecDeque<Snapshot>>,
    rules: Vec<WatchRule>,
    alerts: Vec<WatchAlert>,
}

impl ChangeDetector {
    pub fn new(config: &ChangeDetectionConfig) -> Self {
        Self {
            retention: config.retention.max(1),
            alert_retention: config.alert_retention.max(1),
            history: HashMap::new(),
            rules: config.watch_rules.clone(),
            alerts: Vec::new(),
        }
    }

    pub fn add_rule(&mut self, rule: WatchRule) {
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// The most recent alerts, oldest first.
    pub fn alerts(&self) -> &[WatchAlert] {
        &self.alerts
    }

    /// Hand over the buffered alerts, leaving the log empty.
    pub fn take_alerts(&mut self) -> Vec<WatchAlert> {
        std::mem::take(&mut self.alerts)
    }

    /// Snapshots for a page, oldest first.
    pub fn history(&self, page_url: &str) -> Vec<&Snapshot> {
        key(page_url)
            .and_then(|k| self.history.get(&k))
            .map(|h| h.iter().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, page_url: &str) -> Option<&Snapshot> {
        key(page_url)
            .and_then(|k| self.history.get(&k))
            .and_then(|h| h.back())
    }

    /// Restore a snapshot saved by an earlier run.
    pub fn import(&mut self, snapshot: Snapshot) {
        let Some(k) = key(&snapshot.page_url) else {
            return;
        };
        let entries = self.history.entry(k).or_default();
        let position = entries
            .iter()
            .position(|s| s.captured_at > snapshot.captured_at)
            .unwrap_or(entries.len());
        entries.insert(position, snapshot);
        while entries.len() > self.retention {
            entries.pop_front();
        }
    }

    /// Snapshot `text`, diff it against the page's last snapshot and run
    /// the page's watch rules. The first capture of a page is a baseline
    /// and raises no alerts.
    pub fn capture(&mut self, page_url: &str, text: &str) -> Capture {
        let mut snapshot = create_snapshot(page_url, text);
        let Some(k) = key(page_url) else {
            return Capture {
                snapshot,
                diff: None,
                alerts: Vec::new(),
            };
        };

        let previous = self.history.get(&k).and_then(|h| h.back()).cloned();
        if let Some(prev) = &previous {
            // Keep history ordered even if the clock steps backwards.
            if snapshot.captured_at < prev.captured_at {
                snapshot.captured_at = prev.captured_at;
            }
        }

        let diff = previous.as_ref().map(|prev| diff(prev, &snapshot));
        let mut alerts = Vec::new();
        if let (Some(prev), Some(diff)) = (&previous, &diff) {
            let now = Utc::now();
            for rule in self
                .rules
                .iter_mut()
                .filter(|r| r.is_enabled && key(&r.page_url).as_deref() == Some(k.as_str()))
            {
                rule.last_checked = Some(now);
                let triggers = evaluate_rule(rule, prev, &snapshot, diff);
                if triggers.is_empty() {
                    continue;
                }
                rule.last_change_detected = Some(now);
                info!(
                    "Watch rule {} fired for {} ({} trigger(s))",
                    rule.id,
                    page_url,
                    triggers.len()
                );
                alerts.push(WatchAlert {
                    rule_id: rule.id.clone(),
                    page_url: page_url.to_string(),
                    triggers,
                    detected_at: now,
                });
            }
            if diff.has_changes {
                debug!(
                    "{} changed {:.1}% since last snapshot",
                    page_url, diff.change_percentage
                );
            }
        }

        let entries = self.history.entry(k).or_default();
        entries.push_back(snapshot.clone());
        while entries.len() > self.retention {
            entries.pop_front();
        }
        self.alerts.extend(alerts.iter().cloned());
        if self.alerts.len() > self.alert_retention {
            let excess = self.alerts.len() - self.alert_retention;
            self.alerts.drain(..excess);
        }

        Capture {
            snapshot,
            diff,
            alerts,
        }
    }

    /// Snapshot every scraped page until the crawl completes or the channel closes.
    pub async fn observe(mut self, mut rx: Receiver<CrawlEvent>) -> Self {
        loop {
            match rx.recv().await {
                Ok(CrawlEvent::PageScraped(page)) => {
                    self.capture(&page.url, &page.text);
                }
                Ok(CrawlEvent::Completed(_)) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!(missed = n, "change detector lagged behind crawl events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        self
    }
}

fn key(page_url: &str) -> Option<String> {
    normalize(page_url)
}
