//! File Config Source
//!
//! This module provides a config source reading values out of a structured
//! document on disk: JSON, TOML or YAML. The selector is a dot-separated
//! path into the document; an empty selector returns the whole document.
//!
//! # Settings
//!
//! ```yaml
//! config_sources:
//!   file/secrets:
//!     path: /etc/app/secrets.yaml
//!     # optional, inferred from the extension otherwise
//!     format: yaml
//!     # optional, enables change watching by polling the modification time
//!     poll_interval_ms: 5000
//! ```
//!
//! # Example
//!
//! ```yaml
//! database:
//!   password: $file/secrets:database.password
//!   pool_size: "${file/secrets:database.pool?default=10}"
//! ```

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::traits::{
    ConfigSource, ConfigSourceError, ConfigSourceFactory, Retrieved, SourceResult,
};
use crate::invocation::Params;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Json,
    Toml,
    Yaml,
}

impl FileFormat {
    /// Infer the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "yaml" | "yml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }

    /// Parse document content into a configuration tree
    pub fn parse(&self, content: &str) -> SourceResult<JsonValue> {
        match self {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigSourceError::SerializationError(e.to_string())),
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ConfigSourceError::SerializationError(e.to_string())),
            FileFormat::Toml => {
                let value: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigSourceError::SerializationError(e.to_string()))?;
                serde_json::to_value(value)
                    .map_err(|e| ConfigSourceError::SerializationError(e.to_string()))
            }
        }
    }
}

/// Settings of the `file` source type
#[derive(Debug, Clone, Deserialize)]
pub struct FileSourceConfig {
    /// Document path
    pub path: PathBuf,
    /// Document format, inferred from the extension when absent
    #[serde(default)]
    pub format: Option<FileFormat>,
    /// Poll interval of the change watch; no watch when absent
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

/// Config source reading values from a JSON, TOML or YAML file
///
/// The file is read on every retrieval, so a new resolution pass always sees
/// the current content.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    format: FileFormat,
    poll_interval: Option<Duration>,
}

impl FileSource {
    /// Create a source from settings
    pub fn new(config: FileSourceConfig) -> SourceResult<Self> {
        let format = match config.format {
            Some(format) => format,
            None => FileFormat::from_path(&config.path).ok_or_else(|| {
                ConfigSourceError::ConfigurationError(format!(
                    "cannot infer format of {}; set `format`",
                    config.path.display()
                ))
            })?,
        };

        if config.poll_interval_ms == Some(0) {
            return Err(ConfigSourceError::ConfigurationError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            path: config.path,
            format,
            poll_interval: config.poll_interval_ms.map(Duration::from_millis),
        })
    }

    /// Create a source for a file, inferring its format
    pub fn from_file(path: impl AsRef<Path>) -> SourceResult<Self> {
        Self::new(FileSourceConfig {
            path: path.as_ref().to_path_buf(),
            format: None,
            poll_interval_ms: None,
        })
    }

    /// Enable change watching (builder pattern)
    ///
    /// Intervals shorter than one millisecond are raised to one millisecond.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval.max(MIN_POLL_INTERVAL));
        self
    }

    async fn load(&self) -> SourceResult<JsonValue> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        self.format.parse(&content)
    }

    async fn modified(path: &Path) -> SourceResult<SystemTime> {
        Ok(tokio::fs::metadata(path).await?.modified()?)
    }
}

/// Walk a dot-separated path; numeric segments index into sequences
fn select<'a>(document: &'a JsonValue, selector: &str) -> Option<&'a JsonValue> {
    if selector.is_empty() {
        return Some(document);
    }
    selector.split('.').try_fold(document, |current, segment| match current {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[async_trait::async_trait]
impl ConfigSource for FileSource {
    async fn retrieve(&self, selector: &str, params: Option<&Params>) -> SourceResult<Retrieved> {
        let document = self.load().await?;

        let value = match select(&document, selector) {
            Some(value) => value.clone(),
            None => params
                .and_then(|p| p.get("default"))
                .cloned()
                .ok_or_else(|| ConfigSourceError::not_found(selector))?,
        };

        let Some(interval) = self.poll_interval else {
            return Ok(Retrieved::new(value));
        };

        let path = self.path.clone();
        let seen = FileSource::modified(&path).await?;
        Ok(Retrieved::new(value).with_watch(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let current = FileSource::modified(&path).await?;
                if current != seen {
                    tracing::debug!(path = %path.display(), "Config file modified");
                    return Ok(());
                }
            }
        }))
    }
}

/// Factory for the `file` source type
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSourceFactory;

impl ConfigSourceFactory for FileSourceFactory {
    fn type_name(&self) -> &str {
        "file"
    }

    fn create(&self, name: &str, settings: &JsonValue) -> SourceResult<Arc<dyn ConfigSource>> {
        let config: FileSourceConfig = serde_json::from_value(settings.clone()).map_err(|e| {
            ConfigSourceError::ConfigurationError(format!("{}: {}", name, e))
        })?;
        Ok(Arc::new(FileSource::new(config)?))
    }
}
