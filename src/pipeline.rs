use anyhow::Context as _;

use crate::cli::{GlobalArgs, RunArgs};
use crate::config::Config;
use crate::detail::DetailExtractor;
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::fetch::{HttpPageSource, PageSource};
use crate::listing::{CrawlStop, ListingCrawler};
use crate::progress::ProgressStore;
use crate::record_store::RecordStore;

/// Everything one run needs, passed explicitly to each stage.
pub struct RunContext {
    pub config: Config,
    pub progress: ProgressStore,
    pub source: Box<dyn PageSource>,
}

impl RunContext {
    pub fn new(config: Config, progress: ProgressStore) -> anyhow::Result<Self> {
        let source = HttpPageSource::new(config.timeout)?;
        Ok(Self {
            config,
            progress,
            source: Box::new(source),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub links_found: usize,
    pub videos_saved: u64,
    pub videos_failed: u64,
    pub cursor: Option<u32>,
    pub total_videos_parsed: u64,
    pub progress_saved: bool,
    pub stop: CrawlStop,
    pub dispatch: Option<DispatchStats>,
}

/// Crawl, scrape, save progress, then optionally dispatch every stored record.
pub fn execute(ctx: &RunContext, dispatch: bool) -> anyhow::Result<RunSummary> {
    let _span = tracing::info_span!("run", pages_per_run = ctx.config.pages_per_run).entered();

    let cursor = ctx.progress.load();
    let crawler = ListingCrawler::new(&ctx.config)?;
    let outcome = crawler.crawl(
        ctx.source.as_ref(),
        cursor.resume_page(),
        ctx.config.pages_per_run,
    );

    let extractor = DetailExtractor::new(RecordStore::new(&ctx.config.downloads_dir))?;
    let mut videos_saved = 0_u64;
    let mut videos_failed = 0_u64;
    for (index, link) in outcome.links.iter().enumerate() {
        tracing::debug!(index, total = outcome.links.len(), %link, "scrape video");
        if extractor.extract_and_save(ctx.source.as_ref(), link) {
            videos_saved += 1;
        } else {
            videos_failed += 1;
        }
    }

    let merged = cursor.advance(outcome.last_page_visited, videos_saved);
    let progress_saved = ctx
        .progress
        .save(merged.last_parsed_page, merged.total_videos_parsed);
    if !progress_saved {
        tracing::warn!("progress not saved; the next run will not resume from this one");
    }

    let dispatch = if dispatch {
        Some(Dispatcher::from_config(&ctx.config)?.dispatch_all())
    } else {
        None
    };

    let summary = RunSummary {
        links_found: outcome.links.len(),
        videos_saved,
        videos_failed,
        cursor: merged.last_parsed_page,
        total_videos_parsed: merged.total_videos_parsed,
        progress_saved,
        stop: outcome.stop,
        dispatch,
    };
    tracing::info!(?summary, "run finished");
    Ok(summary)
}

pub fn run(global: &GlobalArgs, args: RunArgs) -> anyhow::Result<()> {
    let config = Config::load(&global.config).context("load config")?;
    let ctx = RunContext::new(config, ProgressStore::new(&global.progress))?;
    let summary = execute(&ctx, !args.no_dispatch)?;

    println!("links found: {}", summary.links_found);
    println!(
        "videos saved: {} (failed: {})",
        summary.videos_saved, summary.videos_failed
    );
    match summary.cursor {
        Some(page) => println!("last parsed page: {page}"),
        None => println!("last parsed page: none"),
    }
    println!("total videos parsed: {}", summary.total_videos_parsed);
    if let Some(stats) = summary.dispatch {
        println!(
            "downloads total: {}, queued: {}, failed: {}",
            stats.total, stats.queued, stats.failed
        );
    }
    Ok(())
}
