//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod crawl;
mod dedup;
mod normalize;
mod robots;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CrawlConfig;

pub use crawl::CrawlArgs;

#[derive(Parser)]
#[command(name = "sitecrawl")]
#[command(about = "Polite website crawler with extraction, dedup and change detection")]
#[command(version)]
pub struct Cli {
    /// Crawl configuration file (TOML or JSON)
    #[arg(short, long, global = true, env = "SITECRAWL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more seed URLs
    Crawl(CrawlArgs),

    /// Fetch robots.txt for a URL and check whether it may be crawled
    Robots {
        url: String,
        /// User agent to evaluate (defaults to the crawler's own)
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Hash every file under a directory and report duplicate groups
    Dedup {
        dir: PathBuf,
        /// Also compute MD5
        #[arg(long)]
        md5: bool,
    },

    /// Print the canonical form and category of URLs
    Normalize {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => {
            let config = load_config(cli.config.as_deref()).await?;
            crawl::cmd_crawl(config, args).await
        }
        Commands::Robots { url, user_agent } => {
            let config = load_config(cli.config.as_deref()).await?;
            robots::cmd_robots(&config, &url, user_agent.as_deref()).await
        }
        Commands::Dedup { dir, md5 } => dedup::cmd_dedup(&dir, md5).await,
        Commands::Normalize { urls } => normalize::cmd_normalize(&urls),
    }
}

async fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<CrawlConfig> {
    match path {
        Some(path) => Ok(CrawlConfig::load_from_path(path).await?),
        None => Ok(CrawlConfig::default()),
    }
}
