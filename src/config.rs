use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

const PAGE_PLACEHOLDERS: [&str; 2] = ["{page}", "{}"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config file {}: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config must be a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{field} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Validated run settings. Loaded once per process and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Listing URL template with a `{page}` (or `{}`) placeholder.
    pub base_url: String,
    pub downloads_dir: PathBuf,
    pub timeout: Duration,
    pub pages_per_run: u32,
    /// Only listing anchors whose href starts with this prefix are kept.
    pub video_link_prefix: String,
    pub downloader_path: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_value(&value)?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let object = value.as_object().ok_or(ConfigError::NotAnObject)?;

        let base_url = required_string(object, "base_url")?;
        let downloads_dir = required_string(object, "downloads_dir")?;
        let timeout = required(object, "timeout")?
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or(ConfigError::InvalidField {
                field: "timeout",
                expected: "a positive number",
            })?;
        let pages_per_run = required(object, "pages_per_parse")?
            .as_u64()
            .filter(|pages| *pages > 0)
            .and_then(|pages| u32::try_from(pages).ok())
            .ok_or(ConfigError::InvalidField {
                field: "pages_per_parse",
                expected: "a positive integer",
            })?;

        let placeholder_at = validate_base_url(&base_url)?;
        let video_link_prefix = match optional_string(object, "video_link_prefix")? {
            Some(prefix) => prefix,
            None => base_url[..placeholder_at].to_owned(),
        };
        let downloader_path = optional_string(object, "downloader_path")?.map(PathBuf::from);

        Ok(Self {
            base_url,
            downloads_dir: PathBuf::from(downloads_dir),
            timeout,
            pages_per_run,
            video_link_prefix,
            downloader_path,
        })
    }

    pub fn listing_url(&self, page: u32) -> String {
        render_listing_url(&self.base_url, page)
    }
}

fn render_listing_url(template: &str, page: u32) -> String {
    let page = page.to_string();
    PAGE_PLACEHOLDERS
        .iter()
        .fold(template.to_owned(), |url, placeholder| {
            url.replace(placeholder, &page)
        })
}

/// Returns the byte offset of the first page placeholder.
fn validate_base_url(template: &str) -> Result<usize, ConfigError> {
    const EXPECTED: &str = "an http(s) URL template containing a {page} placeholder";
    let invalid = ConfigError::InvalidField {
        field: "base_url",
        expected: EXPECTED,
    };

    let Some(placeholder_at) = PAGE_PLACEHOLDERS
        .iter()
        .filter_map(|placeholder| template.find(placeholder))
        .min()
    else {
        return Err(invalid);
    };

    let rendered = render_listing_url(template, 1);
    match Url::parse(&rendered) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(placeholder_at),
        _ => Err(invalid),
    }
}

fn required<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ConfigError> {
    object.get(field).ok_or(ConfigError::MissingField(field))
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, ConfigError> {
    required(object, field)?
        .as_str()
        .map(str::to_owned)
        .ok_or(ConfigError::InvalidField {
            field,
            expected: "a string",
        })
}

fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ConfigError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ConfigError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}
