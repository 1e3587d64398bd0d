use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about,
    after_help = "Exit status is non-zero only when configuration or startup fails; \
                  page, video and downloader errors are logged and skipped."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// JSON config file (base_url, downloads_dir, timeout, pages_per_parse).
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Progress file carrying the crawl cursor between runs.
    #[arg(long, global = true, default_value = "progress.json")]
    pub progress: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl, scrape detail pages, save progress, then dispatch downloads.
    Run(RunArgs),
    /// Crawl listing pages and print the video links found.
    Crawl(CrawlArgs),
    /// Scrape a single video detail page into the downloads dir.
    Scrape(ScrapeArgs),
    /// Queue every quality-tagged URL from saved records in the downloader.
    Dispatch,
    /// Print the stored crawl cursor.
    Progress,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Skip handing URLs to the external downloader.
    #[arg(long)]
    pub no_dispatch: bool,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// First listing page to fetch (default: highest known page).
    #[arg(long)]
    pub start_page: Option<u32>,

    /// Maximum listing pages to fetch (default: pages_per_parse).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Video detail page URL.
    #[arg(long)]
    pub url: String,
}
