use serde::{Deserialize, Serialize};

/// One scraped detail page, stored as `{video_id}.json` under the downloads dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: u64,
    pub title: String,
    pub model: String,
    pub categories: Vec<String>,
    pub video_urls: Vec<String>,
}

/// Persisted crawl cursor shared across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCursor {
    pub last_parsed_page: Option<u32>,
    #[serde(default)]
    pub total_videos_parsed: u64,
}
