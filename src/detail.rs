use std::path::PathBuf;

use anyhow::Context as _;
use regex::Regex;
use scraper::{Html, Selector};

use crate::cli::{GlobalArgs, ScrapeArgs};
use crate::config::Config;
use crate::fetch::{HttpPageSource, PageSource};
use crate::formats::VideoRecord;
use crate::record_store::RecordStore;

const VIDEO_ID_MARKER: &str = "video_id:";
const DOWNLOAD_LINK_SELECTOR: &str = ".pb-download-options a[href]";
const DOWNLOAD_MARKERS: [&str; 2] = ["?download=true", "&download=true"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no script block with a video_id marker")]
    NoVideoScript,

    #[error("video_id value missing")]
    MissingVideoId,

    #[error("video_id is not numeric: {0:?}")]
    NonNumericVideoId(String),
}

/// Pulls video metadata and download links out of detail pages and persists
/// one record per video.
#[derive(Debug, Clone)]
pub struct DetailExtractor {
    store: RecordStore,
    script_selector: Selector,
    download_selector: Selector,
    video_id: Regex,
    title: Regex,
    models: Regex,
    categories: Regex,
}

impl DetailExtractor {
    pub fn new(store: RecordStore) -> anyhow::Result<Self> {
        let selector = |raw: &str| {
            Selector::parse(raw).map_err(|err| anyhow::anyhow!("parse selector {raw:?}: {err}"))
        };
        let field = |name: &str| {
            Regex::new(&format!(r"{name}:\s*'([^']*)'"))
                .with_context(|| format!("compile pattern for {name}"))
        };

        Ok(Self {
            store,
            script_selector: selector("script")?,
            download_selector: selector(DOWNLOAD_LINK_SELECTOR)?,
            video_id: field("video_id")?,
            title: field("video_title")?,
            models: field("video_models")?,
            categories: field("video_categories")?,
        })
    }

    pub fn parse(&self, html: &str) -> Result<VideoRecord, ExtractError> {
        let document = Html::parse_document(html);

        let script = document
            .select(&self.script_selector)
            .filter(|script| script.value().attr("src").is_none())
            .map(|script| script.text().collect::<String>())
            .find(|text| text.contains(VIDEO_ID_MARKER))
            .ok_or(ExtractError::NoVideoScript)?;

        let raw_id = capture(&self.video_id, &script).ok_or(ExtractError::MissingVideoId)?;
        let video_id = raw_id
            .trim()
            .parse::<u64>()
            .map_err(|_| ExtractError::NonNumericVideoId(raw_id.to_owned()))?;

        let title = capture(&self.title, &script)
            .map(sanitize_title)
            .unwrap_or_default();
        let model = capture(&self.models, &script)
            .unwrap_or_default()
            .to_owned();
        let categories = capture(&self.categories, &script)
            .map(split_categories)
            .unwrap_or_default();

        let video_urls = document
            .select(&self.download_selector)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| href.starts_with("http://") || href.starts_with("https://"))
            .map(|href| strip_download_marker(href).to_owned())
            .collect();

        Ok(VideoRecord {
            video_id,
            title,
            model,
            categories,
            video_urls,
        })
    }

    /// Fetches, parses and saves one detail page. Every failure is logged and
    /// reported as `false`; callers skip and continue.
    pub fn extract_and_save<S: PageSource + ?Sized>(&self, source: &S, url: &str) -> bool {
        match self.try_extract_and_save(source, url) {
            Ok(path) => {
                tracing::info!(url, path = %path.display(), "saved video record");
                true
            }
            Err(err) => {
                tracing::warn!(url, ?err, "skip video");
                false
            }
        }
    }

    fn try_extract_and_save<S: PageSource + ?Sized>(
        &self,
        source: &S,
        url: &str,
    ) -> anyhow::Result<PathBuf> {
        let html = source.fetch(url).context("fetch detail page")?;
        let record = self.parse(&html).context("extract video data")?;
        self.store
            .save(&record)
            .with_context(|| format!("save record for video {}", record.video_id))
    }
}

fn capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Drops path separators so the title is safe to reuse in file names.
pub fn sanitize_title(raw: &str) -> String {
    raw.chars().filter(|ch| !matches!(ch, '/' | '\\')).collect()
}

fn split_categories(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .map(str::to_owned)
        .collect()
}

fn strip_download_marker(href: &str) -> &str {
    DOWNLOAD_MARKERS
        .iter()
        .find_map(|marker| href.strip_suffix(marker))
        .unwrap_or(href)
}

pub fn run(global: &GlobalArgs, args: ScrapeArgs) -> anyhow::Result<()> {
    let config = Config::load(&global.config).context("load config")?;
    let source = HttpPageSource::new(config.timeout)?;
    let extractor = DetailExtractor::new(RecordStore::new(&config.downloads_dir))?;

    if !extractor.extract_and_save(&source, &args.url) {
        anyhow::bail!("could not scrape {}", args.url);
    }
    Ok(())
}
