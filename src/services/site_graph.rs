//! Incremental site graph built from crawl events.
//!
//! Nodes live in a flat arena indexed by [`NodeId`] with parent/child id
//! references, so adding or updating a node never rewrites a subtree.

use std::collections::HashMap;

use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, warn};

use crate::crawler::{CrawlEvent, SkipReason};
use crate::models::{NodeId, NodeStatus, SiteMapStats, SiteNode};
use crate::utils::url::normalize;
use crate::utils::FileCategory;

/// Parent/child tree of discovered URLs.
///
/// Invariant: every id in a node's `child_ids` indexes an existing node.
#[derive(Debug, Default)]
pub struct SiteGraph {
    nodes: Vec<SiteNode>,
    index: HashMap<String, NodeId>,
    root: Option<NodeId>,
}

/// Statuses that earlier sightings cannot overwrite.
fn is_settled(status: NodeStatus) -> bool {
    matches!(
        status,
        NodeStatus::Fetched | NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Blocked
    )
}

impl SiteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node for `url`, or update the existing one in place.
    ///
    /// The first node added without a parent becomes the root. Returns `None`
    /// for URLs that cannot be normalized.
    pub fn add_node(
        &mut self,
        url: &str,
        parent_url: Option<&str>,
        depth: u32,
        status: NodeStatus,
        file_type: FileCategory,
    ) -> Option<NodeId> {
        let normalized = normalize(url)?;
        let parent_id = parent_url
            .and_then(normalize)
            .and_then(|p| self.index.get(&p).copied());

        if let Some(&id) = self.index.get(&normalized) {
            let is_root = self.root == Some(id);
            let node = &mut self.nodes[id.0];
            if !(is_settled(node.status) && !is_settled(status)) {
                node.status = status;
            }
            node.depth = node.depth.min(depth);
            if node.file_type == FileCategory::Page && file_type != FileCategory::Page {
                node.file_type = file_type;
            }

            // Late parent for an orphan.
            if node.parent_id.is_none() && !is_root {
                if let Some(pid) = parent_id.filter(|&pid| pid != id) {
                    node.parent_id = Some(pid);
                    self.nodes[pid.0].child_ids.push(id);
                }
            }
            return Some(id);
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(SiteNode {
            id,
            url: url.to_string(),
            normalized_url: normalized.clone(),
            parent_id,
            child_ids: Vec::new(),
            depth,
            status,
            file_type,
            title: None,
            status_code: None,
        });
        self.index.insert(normalized, id);

        match parent_id {
            Some(pid) => self.nodes[pid.0].child_ids.push(id),
            None if self.root.is_none() => self.root = Some(id),
            None => {}
        }
        Some(id)
    }

    /// Fold one crawl event into the graph.
    pub fn apply(&mut self, event: &CrawlEvent) {
        match event {
            CrawlEvent::UrlDiscovered {
                url,
                parent_url,
                depth,
                category,
                queued,
                external,
            } => {
                let status = if *external && !*queued {
                    NodeStatus::External
                } else if *queued {
                    NodeStatus::Queued
                } else {
                    NodeStatus::Discovered
                };
                self.add_node(url, parent_url.as_deref(), *depth, status, *category);
            }
            CrawlEvent::PageScraped(page) => {
                let id = self.add_node(
                    &page.url,
                    page.parent_url.as_deref(),
                    page.depth,
                    NodeStatus::Fetched,
                    FileCategory::Page,
                );
                if let Some(node) = id.and_then(|id| self.nodes.get_mut(id.0)) {
                    node.title = page.title.clone();
                    node.status_code = Some(page.status_code);
                }
            }
            CrawlEvent::FileDiscovered {
                url,
                parent_url,
                category,
            } => {
                let depth = self.find(parent_url).map_or(1, |p| p.depth + 1);
                self.add_node(
                    url,
                    Some(parent_url),
                    depth,
                    NodeStatus::Discovered,
                    *category,
                );
            }
            CrawlEvent::FileDownloaded(file) => {
                if let Some(id) = self.find(&file.source_url).map(|n| n.id) {
                    self.nodes[id.0].status = NodeStatus::Fetched;
                }
            }
            CrawlEvent::PageSkipped {
                url,
                parent_url,
                depth,
                reason,
            } => {
                let status = match reason {
                    SkipReason::Robots => NodeStatus::Blocked,
                    _ => NodeStatus::Skipped,
                };
                self.add_node(url, parent_url.as_deref(), *depth, status, FileCategory::Page);
            }
            CrawlEvent::PageFailed {
                url,
                parent_url,
                depth,
                status,
                ..
            } => {
                let id = self.add_node(
                    url,
                    parent_url.as_deref(),
                    *depth,
                    NodeStatus::Failed,
                    FileCategory::Page,
                );
                if let Some(node) = id.and_then(|id| self.nodes.get_mut(id.0)) {
                    node.status_code = *status;
                }
            }
            CrawlEvent::Started { .. }
            | CrawlEvent::StatusChanged { .. }
            | CrawlEvent::Progress(_)
            | CrawlEvent::Completed(_) => {}
        }
    }

    /// Consume events until the crawl completes or the channel closes.
    pub async fn observe(mut self, mut rx: Receiver<CrawlEvent>) -> Self {
        loop {
            match rx.recv().await {
                Ok(CrawlEvent::Completed(_)) => break,
                Ok(event) => self.apply(&event),
                Err(RecvError::Lagged(n)) => {
                    warn!(missed = n, "site graph lagged behind crawl events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Site graph finished with {} nodes", self.nodes.len());
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[SiteNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&SiteNode> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> Option<&SiteNode> {
        self.root.and_then(|id| self.node(id))
    }

    /// Look up a node by any spelling of its URL.
    pub fn find(&self, url: &str) -> Option<&SiteNode> {
        let key = normalize(url)?;
        self.index.get(&key).and_then(|&id| self.node(id))
    }

    pub fn children(&self, id: NodeId) -> Vec<&SiteNode> {
        self.node(id)
            .map(|n| n.child_ids.iter().filter_map(|&c| self.node(c)).collect())
            .unwrap_or_default()
    }

    pub fn nodes_at_depth(&self, depth: u32) -> Vec<&SiteNode> {
        self.nodes.iter().filter(|n| n.depth == depth).collect()
    }

    /// `id` and all of its descendants, depth-first pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<&SiteNode> {
        let mut out = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if std::mem::replace(&mut seen[current.0], true) {
                continue;
            }
            out.push(node);
            stack.extend(node.child_ids.iter().rev());
        }
        out
    }

    /// Nodes from `id` up to its topmost ancestor, `id` first.
    pub fn path_to_root(&self, id: NodeId) -> Vec<&SiteNode> {
        let mut path = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            if path.len() > self.nodes.len() {
                break;
            }
            path.push(node);
            current = node.parent_id.and_then(|p| self.node(p));
        }
        path
    }

    /// Aggregate statistics, computed from the current nodes.
    pub fn stats(&self) -> SiteMapStats {
        let mut stats = SiteMapStats {
            total_nodes: self.nodes.len(),
            ..Default::default()
        };
        for node in &self.nodes {
            stats.max_depth = stats.max_depth.max(node.depth);
            if node.parent_id.is_none() && self.root != Some(node.id) {
                stats.orphans += 1;
            }
            if node.file_type.is_file() {
                stats.files += 1;
            }
            match node.status {
                NodeStatus::Fetched => stats.fetched += 1,
                NodeStatus::Discovered | NodeStatus::Queued | NodeStatus::Fetching => {
                    stats.pending += 1
                }
                NodeStatus::Failed => stats.broken += 1,
                NodeStatus::External => stats.external += 1,
                NodeStatus::Blocked => stats.blocked += 1,
                NodeStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }
}
