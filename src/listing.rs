use anyhow::Context as _;
use scraper::{Html, Selector};

use crate::cli::{CrawlArgs, GlobalArgs};
use crate::config::Config;
use crate::fetch::{FetchError, HttpPageSource, PageSource};

/// Highest known listing page; used when no cursor has been stored yet.
pub const DEFAULT_START_PAGE: u32 = 1515;
pub const MIN_PAGE: u32 = 1;

const VIDEO_LINK_SELECTOR: &str = "a.pb-item-link.pb-item-link-video";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStop {
    /// Walked below page 1. Nothing older is left to crawl.
    ReachedBeginning,
    /// `pages_per_run` pages were processed. Resumable.
    BudgetExhausted,
    /// The fetch of `page` failed. The next run retries it.
    FetchFailed { page: u32 },
    /// `page` parsed to zero video links.
    EmptyPage { page: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// Detail-page URLs in visit order, then page order. Not deduplicated.
    pub links: Vec<String>,
    /// Lowest page successfully processed; `None` if no page was.
    pub last_page_visited: Option<u32>,
    pub pages_processed: u32,
    pub stop: CrawlStop,
}

#[derive(Debug, Clone)]
pub struct ListingCrawler {
    config: Config,
    link_selector: Selector,
}

impl ListingCrawler {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let link_selector = Selector::parse(VIDEO_LINK_SELECTOR)
            .map_err(|err| anyhow::anyhow!("parse video link selector: {err}"))?;
        Ok(Self {
            config: config.clone(),
            link_selector,
        })
    }

    /// Walks listing pages downward from `start_page` (or
    /// [`DEFAULT_START_PAGE`]), one fetch per page.
    pub fn crawl<S: PageSource + ?Sized>(
        &self,
        source: &S,
        start_page: Option<u32>,
        pages_per_run: u32,
    ) -> CrawlOutcome {
        let mut page = start_page.unwrap_or(DEFAULT_START_PAGE);
        let mut links = Vec::new();
        let mut last_page_visited = None;
        let mut pages_processed = 0_u32;

        tracing::info!(start_page = page, pages_per_run, "crawl listing");

        let stop = loop {
            if page < MIN_PAGE {
                tracing::info!("reached the beginning of the listing");
                break CrawlStop::ReachedBeginning;
            }
            if pages_processed >= pages_per_run {
                tracing::info!(pages_processed, "page budget exhausted");
                break CrawlStop::BudgetExhausted;
            }

            let url = self.config.listing_url(page);
            let html = match source.fetch(&url) {
                Ok(html) => html,
                Err(FetchError::NotFound) => {
                    tracing::info!(page, "404, no more pages");
                    break CrawlStop::FetchFailed { page };
                }
                Err(err) => {
                    tracing::error!(page, %err, "listing fetch failed");
                    break CrawlStop::FetchFailed { page };
                }
            };

            let page_links = self.parse_video_links(&html);
            if page_links.is_empty() {
                tracing::warn!(page, "no video links found");
                break CrawlStop::EmptyPage { page };
            }

            links.extend(page_links.iter().cloned());
            tracing::info!(
                page,
                found = page_links.len(),
                total = links.len(),
                "parsed listing page"
            );

            last_page_visited = Some(page);
            page -= 1;
            pages_processed += 1;
        };

        CrawlOutcome {
            links,
            last_page_visited,
            pages_processed,
            stop,
        }
    }

    pub fn parse_video_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.link_selector)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| href.starts_with(&self.config.video_link_prefix))
            .map(str::to_owned)
            .collect()
    }
}

pub fn run(global: &GlobalArgs, args: CrawlArgs) -> anyhow::Result<()> {
    let config = Config::load(&global.config).context("load config")?;
    let source = HttpPageSource::new(config.timeout)?;
    let crawler = ListingCrawler::new(&config)?;

    let pages = args.pages.unwrap_or(config.pages_per_run);
    let outcome = crawler.crawl(&source, args.start_page, pages);
    if outcome.links.is_empty() {
        tracing::warn!(stop = ?outcome.stop, "no video links found");
    } else {
        tracing::info!(
            links = outcome.links.len(),
            last_page_visited = ?outcome.last_page_visited,
            stop = ?outcome.stop,
            "crawl finished"
        );
    }

    for link in &outcome.links {
        println!("{link}");
    }
    Ok(())
}
