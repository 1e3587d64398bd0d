use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::formats::VideoRecord;

/// Flat directory of `{video_id}.json` records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, video_id: u64) -> PathBuf {
        self.dir.join(format!("{video_id}.json"))
    }

    /// Replaces any existing record for the same video wholesale.
    pub fn save(&self, record: &VideoRecord) -> anyhow::Result<PathBuf> {
        let path = self.record_path(record.video_id);
        crate::json_store::write_json_atomic(&path, record)?;
        Ok(path)
    }

    /// Every parseable record under the directory, recursively, in path order.
    /// Unreadable entries and non-record JSON files are logged and skipped.
    pub fn scan(&self) -> Vec<(PathBuf, VideoRecord)> {
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(%err, "walk downloads dir");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match crate::json_store::read_json::<VideoRecord>(entry.path()) {
                Ok(Some(record)) => records.push((entry.into_path(), record)),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        ?err,
                        "skip unreadable record"
                    );
                }
            }
        }
        records
    }
}
