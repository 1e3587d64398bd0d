use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;
use crate::formats::ProgressCursor;
use crate::listing::MIN_PAGE;

impl ProgressCursor {
    /// Page the next crawl should start from: one below the stored cursor, so
    /// the page after the last good one is fetched first. `None` means fresh.
    pub fn resume_page(&self) -> Option<u32> {
        self.last_parsed_page
            .map(|page| if page > MIN_PAGE { page - 1 } else { MIN_PAGE })
    }

    /// Merges one run's result. A run that visited no page keeps the old cursor.
    #[must_use]
    pub fn advance(self, last_page_visited: Option<u32>, videos_parsed: u64) -> Self {
        Self {
            last_parsed_page: last_page_visited.or(self.last_parsed_page),
            total_videos_parsed: self.total_videos_parsed.saturating_add(videos_parsed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable file yields a fresh cursor.
    pub fn load(&self) -> ProgressCursor {
        match crate::json_store::read_json::<ProgressCursor>(&self.path) {
            Ok(Some(cursor)) => {
                tracing::info!(
                    last_parsed_page = ?cursor.last_parsed_page,
                    total_videos_parsed = cursor.total_videos_parsed,
                    "loaded progress"
                );
                cursor
            }
            Ok(None) => {
                tracing::warn!(path = %self.path.display(), "no progress file; starting fresh crawl");
                ProgressCursor::default()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), ?err, "unreadable progress file; starting fresh crawl");
                ProgressCursor::default()
            }
        }
    }

    /// Overwrites the progress file. Failure is logged and reported, not raised.
    pub fn save(&self, last_page: Option<u32>, total_videos: u64) -> bool {
        let cursor = ProgressCursor {
            last_parsed_page: last_page,
            total_videos_parsed: total_videos,
        };
        match crate::json_store::write_json_atomic(&self.path, &cursor) {
            Ok(()) => {
                tracing::info!(last_page = ?last_page, total_videos, "progress saved");
                true
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), ?err, "save progress");
                false
            }
        }
    }
}

pub fn run(global: &GlobalArgs) -> anyhow::Result<()> {
    let store = ProgressStore::new(&global.progress);
    let cursor = store.load();
    let last_page = cursor
        .last_parsed_page
        .map_or_else(|| "none".to_owned(), |page| page.to_string());
    println!("last_parsed_page: {last_page}");
    println!("total_videos_parsed: {}", cursor.total_videos_parsed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = ProgressStore::new(temp.path().join("progress.json"));

        assert!(store.save(Some(1203), 417));
        let reloaded = ProgressStore::new(store.path()).load();
        assert_eq!(
            reloaded,
            ProgressCursor {
                last_parsed_page: Some(1203),
                total_videos_parsed: 417,
            }
        );
        Ok(())
    }

    #[test]
    fn file_format_uses_documented_keys() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("progress.json");
        assert!(ProgressStore::new(&path).save(None, 0));

        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(
            value,
            serde_json::json!({ "last_parsed_page": null, "total_videos_parsed": 0 })
        );
        Ok(())
    }

    #[test]
    fn missing_or_corrupt_file_loads_fresh_cursor() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("progress.json");
        let store = ProgressStore::new(&path);
        assert_eq!(store.load(), ProgressCursor::default());

        std::fs::write(&path, "{\"last_parsed_page\": ")?;
        assert_eq!(store.load(), ProgressCursor::default());

        std::fs::write(&path, "{\"last_parsed_page\": -4, \"total_videos_parsed\": 1}")?;
        assert_eq!(store.load(), ProgressCursor::default());
        Ok(())
    }

    #[test]
    fn save_reports_failure_instead_of_raising() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "file, not a dir")?;

        let store = ProgressStore::new(blocker.join("progress.json"));
        assert!(!store.save(Some(3), 3));
        Ok(())
    }

    #[test]
    fn resume_page_steps_back_one_except_at_minimum() {
        let fresh = ProgressCursor::default();
        assert_eq!(fresh.resume_page(), None);

        let mid = ProgressCursor {
            last_parsed_page: Some(9),
            total_videos_parsed: 8,
        };
        assert_eq!(mid.resume_page(), Some(8));

        let bottom = ProgressCursor {
            last_parsed_page: Some(1),
            total_videos_parsed: 8,
        };
        assert_eq!(bottom.resume_page(), Some(1));
    }

    #[test]
    fn advance_only_grows_total_and_keeps_cursor_when_idle() {
        let cursor = ProgressCursor {
            last_parsed_page: Some(40),
            total_videos_parsed: 100,
        };

        let moved = cursor.advance(Some(38), 12);
        assert_eq!(moved.last_parsed_page, Some(38));
        assert_eq!(moved.total_videos_parsed, 112);

        let idle = cursor.advance(None, 0);
        assert_eq!(idle, cursor);

        let saturated = ProgressCursor {
            last_parsed_page: None,
            total_videos_parsed: u64::MAX,
        }
        .advance(Some(1), 5);
        assert_eq!(saturated.total_videos_parsed, u64::MAX);
    }
}
