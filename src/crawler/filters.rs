//! Allow/deny patterns and crawl scope.

use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

use crate::utils::url::base_domain;

/// Regex whitelist and blacklist over absolute URLs.
///
/// Invalid patterns are logged and ignored.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
}

impl UrlFilter {
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Self {
        Self {
            whitelist: compile_patterns(whitelist, "whitelist"),
            blacklist: compile_patterns(blacklist, "blacklist"),
        }
    }

    /// A URL passes when it matches no blacklist pattern and, if a
    /// whitelist is configured, at least one whitelist pattern.
    pub fn allows(&self, url: &str) -> bool {
        if self.blacklist.iter().any(|re| re.is_match(url)) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.iter().any(|re| re.is_match(url))
    }
}

fn compile_patterns(patterns: &[String], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Ignoring invalid {} pattern '{}': {}", kind, p, e);
                None
            }
        })
        .collect()
}

/// Which URLs count as internal to the crawl.
///
/// Internal means sharing the registrable domain (last two labels) of a seed.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    domains: HashSet<String>,
    follow_external: bool,
}

impl Scope {
    pub fn new<'a>(seeds: impl IntoIterator<Item = &'a str>, follow_external: bool) -> Self {
        Self {
            domains: seeds.into_iter().filter_map(base_domain).collect(),
            follow_external,
        }
    }

    pub fn is_internal(&self, url: &str) -> bool {
        base_domain(url).is_some_and(|d| self.domains.contains(&d))
    }

    /// Whether links to `url` are followed.
    pub fn follows(&self, url: &str) -> bool {
        self.follow_external || self.is_internal(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklist_wins() {
        let filter = UrlFilter::new(
            &["example\\.com/docs".into()],
            &["/docs/private".into()],
        );
        assert!(filter.allows("https://example.com/docs/intro"));
        assert!(!filter.allows("https://example.com/docs/private/x"));
        assert!(!filter.allows("https://example.com/blog"));
    }

    #[test]
    fn test_empty_whitelist_allows_all() {
        let filter = UrlFilter::new(&[], &["\\.zip$".into()]);
        assert!(filter.allows("https://example.com/anything"));
        assert!(!filter.allows("https://example.com/a.zip"));
    }

    #[test]
    fn test_invalid_patterns_ignored() {
        let filter = UrlFilter::new(&["(".into()], &["[".into()]);
        assert!(filter.allows("https://example.com/"));
    }

    #[test]
    fn test_scope() {
        let scope = Scope::new(["https://www.example.com/start"], false);
        assert!(scope.is_internal("https://blog.example.com/post"));
        assert!(!scope.is_internal("https://example.org/"));
        assert!(!scope.follows("https://example.org/"));

        let open = Scope::new(["https://example.com/"], true);
        assert!(open.follows("https://example.org/"));
        assert!(!open.is_internal("https://example.org/"));
    }
}
