//! The URL frontier.

use std::collections::{HashSet, VecDeque};

use crate::config::CrawlStrategy;
use crate::models::QueuedUrl;
use crate::utils::url::normalize;

/// Pending URLs, ordered by strategy: FIFO for breadth-first, LIFO for
/// depth-first.
///
/// A normalized URL is held at most once at a time.
#[derive(Debug)]
pub struct Frontier {
    strategy: CrawlStrategy,
    queue: VecDeque<QueuedUrl>,
    pending: HashSet<String>,
}

impl Frontier {
    pub fn new(strategy: CrawlStrategy) -> Self {
        Self {
            strategy,
            queue: VecDeque::new(),
            pending: HashSet::new(),
        }
    }

    /// Queue a URL. Returns false for unparseable URLs and URLs already pending.
    pub fn push(&mut self, item: QueuedUrl) -> bool {
        let Some(key) = normalize(&item.url) else {
            return false;
        };
        if !self.pending.insert(key) {
            return false;
        }
        self.queue.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<QueuedUrl> {
        let item = match self.strategy {
            CrawlStrategy::BreadthFirst => self.queue.pop_front(),
            CrawlStrategy::DepthFirst => self.queue.pop_back(),
        }?;
        if let Some(key) = normalize(&item.url) {
            self.pending.remove(&key);
        }
        Some(item)
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.pending.contains(normalized)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(url: &str) -> QueuedUrl {
        QueuedUrl::new(url.to_string(), 1, None)
    }

    fn drain(frontier: &mut Frontier) -> Vec<String> {
        std::iter::from_fn(|| frontier.pop()).map(|i| i.url).collect()
    }

    #[test]
    fn test_breadth_first_is_fifo() {
        let mut frontier = Frontier::new(CrawlStrategy::BreadthFirst);
        for url in ["https://e.com/a", "https://e.com/b", "https://e.com/c"] {
            assert!(frontier.push(q(url)));
        }
        assert_eq!(
            drain(&mut frontier),
            vec!["https://e.com/a", "https://e.com/b", "https://e.com/c"]
        );
    }

    #[test]
    fn test_depth_first_is_lifo() {
        let mut frontier = Frontier::new(CrawlStrategy::DepthFirst);
        for url in ["https://e.com/a", "https://e.com/b", "https://e.com/c"] {
            frontier.push(q(url));
        }
        assert_eq!(
            drain(&mut frontier),
            vec!["https://e.com/c", "https://e.com/b", "https://e.com/a"]
        );
    }

    #[test]
    fn test_duplicates_by_normalized_form() {
        let mut frontier = Frontier::new(CrawlStrategy::BreadthFirst);
        assert!(frontier.push(q("https://e.com/a?y=2&x=1")));
        assert!(!frontier.push(q("HTTPS://E.COM/a/?x=1&y=2#top")));
        assert!(!frontier.push(q("not a url")));
        assert_eq!(frontier.len(), 1);

        frontier.pop();
        // Once dequeued the URL may be pushed again; the visited set guards that.
        assert!(frontier.push(q("https://e.com/a?x=1&y=2")));
    }
}
