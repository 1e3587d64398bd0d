use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use regex::Regex;
use url::Url;

use crate::cli::GlobalArgs;
use crate::config::Config;
use crate::record_store::RecordStore;

/// Install locations probed after any configured `downloader_path`.
pub const DEFAULT_INSTALL_PATHS: [&str; 2] = [
    r"C:\Program Files (x86)\Internet Download Manager\IDMan.exe",
    r"C:\Program Files\Internet Download Manager\IDMan.exe",
];

const QUALITY_TAG_PATTERN: &str = r"_(\d+p)\.([A-Za-z0-9]+)$";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub total: u32,
    pub queued: u32,
    pub failed: u32,
}

/// The downloader process outlived its deadline and was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("downloader timed out after {}ms", .0.as_millis())]
pub struct DownloaderTimedOut(pub Duration);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Runs `operation` until it succeeds, `max_attempts` is reached, or it
    /// fails with an error `retryable` rejects. Sleeps with a growing delay
    /// between attempts.
    pub fn run<T>(
        &self,
        label: &str,
        retryable: impl Fn(&anyhow::Error) -> bool,
        mut operation: impl FnMut() -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay;
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if !retryable(&err) => {
                    return Err(err.context(format!("{label}: not retried")));
                }
                Err(err) if attempt >= max_attempts => {
                    return Err(err.context(format!("{label}: gave up after {attempt} attempts")));
                }
                Err(err) => {
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        ?err,
                        "attempt failed; retrying"
                    );
                    std::thread::sleep(delay);
                    delay = delay
                        .saturating_mul(self.backoff_multiplier)
                        .min(self.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTag {
    /// e.g. `720p`
    pub quality: String,
    pub extension: String,
}

impl QualityTag {
    pub fn file_name(&self, video_id: u64) -> String {
        format!("{video_id}_{}.{}", self.quality, self.extension)
    }
}

/// Command-line front end of the external download manager.
#[derive(Debug, Clone)]
pub struct ExternalDownloader {
    executable: PathBuf,
    enqueue_timeout: Duration,
    start_timeout: Duration,
    retry: RetryPolicy,
}

impl ExternalDownloader {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            enqueue_timeout: Duration::from_secs(10),
            start_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }

    /// First candidate that exists as a file.
    pub fn locate<P: AsRef<Path>>(candidates: &[P]) -> Option<Self> {
        let found = candidates
            .iter()
            .map(AsRef::as_ref)
            .find(|path| path.is_file())?;
        tracing::info!(path = %found.display(), "found downloader");
        Some(Self::new(found))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, enqueue: Duration, start: Duration) -> Self {
        self.enqueue_timeout = enqueue;
        self.start_timeout = start;
        self
    }

    /// Adds `url` to the downloader's queue without starting it. A timed-out
    /// call fails the URL at once.
    pub fn enqueue(&self, url: &str, dest_dir: &Path, file_name: &str) -> anyhow::Result<()> {
        let args: Vec<OsString> = vec![
            "/d".into(),
            url.into(),
            "/p".into(),
            dest_dir.as_os_str().to_owned(),
            "/f".into(),
            file_name.into(),
            "/n".into(),
            "/a".into(),
        ];
        self.retry.run(
            url,
            |err| err.downcast_ref::<DownloaderTimedOut>().is_none(),
            || self.invoke(&args, self.enqueue_timeout),
        )
    }

    pub fn start_queue(&self) -> anyhow::Result<()> {
        self.invoke(&["/s".into()], self.start_timeout)
    }

    fn invoke(&self, args: &[OsString], timeout: Duration) -> anyhow::Result<()> {
        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn downloader: {}", self.executable.display()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().context("wait downloader")? {
                if !status.success() {
                    anyhow::bail!("downloader exited with {status}");
                }
                return Ok(());
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DownloaderTimedOut(timeout).into());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

/// Hands quality-tagged URLs from every stored record to the external downloader.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: RecordStore,
    downloader: Option<ExternalDownloader>,
    quality_tag: Regex,
}

impl Dispatcher {
    pub fn new(store: RecordStore, downloader: Option<ExternalDownloader>) -> anyhow::Result<Self> {
        let quality_tag =
            Regex::new(QUALITY_TAG_PATTERN).context("compile quality tag pattern")?;
        Ok(Self {
            store,
            downloader,
            quality_tag,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut candidates: Vec<PathBuf> = config.downloader_path.iter().cloned().collect();
        candidates.extend(DEFAULT_INSTALL_PATHS.iter().map(PathBuf::from));
        let downloader = ExternalDownloader::locate(&candidates);
        Self::new(RecordStore::new(&config.downloads_dir), downloader)
    }

    /// `None` when the URL path lacks a `_<n>p.<ext>` suffix.
    pub fn quality_tag(&self, url: &str) -> Option<QualityTag> {
        let parsed = Url::parse(url).ok()?;
        let caps = self.quality_tag.captures(parsed.path())?;
        Some(QualityTag {
            quality: caps[1].to_owned(),
            extension: caps[2].to_owned(),
        })
    }

    pub fn dispatch_all(&self) -> DispatchStats {
        let Some(downloader) = self.downloader.as_ref() else {
            tracing::error!("cannot dispatch downloads: downloader not found");
            return DispatchStats::default();
        };

        let records = self.store.scan();
        if records.is_empty() {
            tracing::warn!(dir = %self.store.dir().display(), "no video records found");
            return DispatchStats::default();
        }
        tracing::info!(records = records.len(), "dispatching downloads");

        let mut stats = DispatchStats::default();
        for (path, record) in &records {
            let dest_dir = path.parent().unwrap_or(self.store.dir());
            let tagged = record
                .video_urls
                .iter()
                .filter_map(|url| self.quality_tag(url).map(|tag| (url, tag)))
                .collect::<Vec<_>>();
            if tagged.is_empty() {
                tracing::info!(video_id = record.video_id, "no quality-tagged urls");
                continue;
            }

            for (url, tag) in tagged {
                stats.total += 1;
                let file_name = tag.file_name(record.video_id);
                match downloader.enqueue(url, dest_dir, &file_name) {
                    Ok(()) => {
                        stats.queued += 1;
                        tracing::info!(video_id = record.video_id, %file_name, "queued");
                    }
                    Err(err) => {
                        stats.failed += 1;
                        tracing::error!(
                            video_id = record.video_id,
                            url,
                            ?err,
                            "enqueue failed"
                        );
                    }
                }
            }
        }

        tracing::info!(
            total = stats.total,
            queued = stats.queued,
            failed = stats.failed,
            "dispatch complete"
        );

        if stats.queued > 0 {
            match downloader.start_queue() {
                Ok(()) => tracing::info!("started download queue"),
                Err(err) => tracing::error!(?err, "start download queue"),
            }
        }

        stats
    }
}

pub fn run(global: &GlobalArgs) -> anyhow::Result<()> {
    let config = Config::load(&global.config).context("load config")?;
    let stats = Dispatcher::from_config(&config)?.dispatch_all();
    println!(
        "total: {}, queued: {}, failed: {}",
        stats.total, stats.queued, stats.failed
    );
    Ok(())
}
