//! Site graph node records.

use serde::{Deserialize, Serialize};

use crate::utils::FileCategory;

/// Index of a node in the site graph arena. Never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// What the crawler knows about a URL in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Discovered,
    Queued,
    Fetching,
    Fetched,
    Failed,
    Skipped,
    /// Disallowed by robots.txt.
    Blocked,
    /// Outside the crawl scope.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteNode {
    pub id: NodeId,
    pub url: String,
    pub normalized_url: String,
    pub parent_id: Option<NodeId>,
    pub child_ids: Vec<NodeId>,
    pub depth: u32,
    pub status: NodeStatus,
    pub file_type: FileCategory,
    pub title: Option<String>,
    pub status_code: Option<u16>,
}

/// Aggregate statistics computed on demand from the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMapStats {
    pub total_nodes: usize,
    pub fetched: usize,
    pub pending: usize,
    pub max_depth: u32,
    /// Non-root nodes without a parent.
    pub orphans: usize,
    /// Nodes whose fetch failed.
    pub broken: usize,
    pub external: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub files: usize,
}
