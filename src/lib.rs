//! sitecrawl - polite website crawler.
//!
//! Crawls a site breadth- or depth-first while honouring robots.txt and
//! per-domain rate limits, extracts structured fields with CSS, XPath,
//! regex and JSON-path rules, downloads and deduplicates linked files, builds
//! a site graph, and tracks page changes across runs.
//!
//! The entry point is [`crawler::Crawler`]; everything else consumes its
//! [`crawler::CrawlEvent`] stream or is a building block it uses.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::CrawlConfig;
pub use crawler::{CrawlHandle, CrawlSummary, Crawler};
pub use error::{CrawlError, ErrorCategory, FetchError};
