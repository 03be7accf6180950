//! In-memory config source
//!
//! `StaticSource` serves values from a map held in memory. Updating a value
//! with [`StaticSource::set`] signals every outstanding watch, which makes
//! it useful for embedding programmatic overrides and for exercising the
//! change notification path.
//!
//! # Settings
//!
//! ```yaml
//! config_sources:
//!   static:
//!     values:
//!       db_host: localhost
//!       db_port: 5432
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use super::traits::{
    ConfigSource, ConfigSourceError, ConfigSourceFactory, Retrieved, SourceResult,
};
use crate::invocation::Params;

/// Settings of the `static` source type
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticSourceConfig {
    /// Selector -> value mapping
    pub values: Map<String, Value>,
}

/// Config source serving values from memory
#[derive(Debug)]
pub struct StaticSource {
    values: RwLock<Map<String, Value>>,
    version: watch::Sender<u64>,
    retrieves: AtomicUsize,
    closes: AtomicUsize,
}

impl StaticSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::from_values(Map::new())
    }

    /// Create a source from a selector -> value map
    pub fn from_values(values: Map<String, Value>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            values: RwLock::new(values),
            version,
            retrieves: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Add a value (builder pattern)
    pub fn with_value(mut self, selector: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(selector.into(), value.into());
        self
    }

    /// Update a value and signal every outstanding watch
    pub fn set(&self, selector: impl Into<String>, value: impl Into<Value>) {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(selector.into(), value.into());
        self.version.send_modify(|v| *v += 1);
    }

    /// Number of `retrieve` calls served
    pub fn retrieve_count(&self) -> usize {
        self.retrieves.load(Ordering::SeqCst)
    }

    /// Number of `close` calls received
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Default for StaticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigSource for StaticSource {
    async fn retrieve(&self, selector: &str, params: Option<&Params>) -> SourceResult<Retrieved> {
        self.retrieves.fetch_add(1, Ordering::SeqCst);

        let value = self
            .values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(selector)
            .cloned();

        let value = match value {
            Some(value) => value,
            None => params
                .and_then(|p| p.get("default"))
                .cloned()
                .ok_or_else(|| ConfigSourceError::not_found(selector))?,
        };

        let mut changes = self.version.subscribe();
        Ok(Retrieved::new(value).with_watch(async move {
            changes
                .changed()
                .await
                .map_err(|_| ConfigSourceError::Unavailable("static source dropped".to_string()))
        }))
    }

    async fn close(&self) -> SourceResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory for the `static` source type
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSourceFactory;

impl ConfigSourceFactory for StaticSourceFactory {
    fn type_name(&self) -> &str {
        "static"
    }

    fn create(&self, _name: &str, settings: &Value) -> SourceResult<Arc<dyn ConfigSource>> {
        let config: StaticSourceConfig = if settings.is_null() {
            StaticSourceConfig::default()
        } else {
            serde_json::from_value(settings.clone())
                .map_err(|e| ConfigSourceError::ConfigurationError(e.to_string()))?
        };
        Ok(Arc::new(StaticSource::from_values(config.values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_retrieve_value() {
        let source = StaticSource::new().with_value("port", 5432);
        let retrieved = source.retrieve("port", None).await.unwrap();
        assert_eq!(retrieved.value(), &json!(5432));
        assert!(retrieved.is_watchable());
        assert_eq!(source.retrieve_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_selector() {
        let source = StaticSource::new();
        let result = source.retrieve("missing", None).await;
        assert!(matches!(result, Err(ConfigSourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_default_param() {
        let source = StaticSource::new();
        let params = json!({"default": "fallback"});
        let retrieved = source
            .retrieve("missing", params.as_object())
            .await
            .unwrap();
        assert_eq!(retrieved.value(), &json!("fallback"));
    }

    #[tokio::test]
    async fn test_set_signals_watch() {
        let source = StaticSource::new().with_value("key", "v1");
        let (_, watch, _) = source.retrieve("key", None).await.unwrap().into_parts();

        source.set("key", "v2");
        assert!(watch.unwrap().await.is_ok());

        let retrieved = source.retrieve("key", None).await.unwrap();
        assert_eq!(retrieved.value(), &json!("v2"));
    }

    #[tokio::test]
    async fn test_writes_survive_poisoned_lock() {
        let source = StaticSource::new().with_value("key", "v1");
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = source.values.write().unwrap();
            panic!("writer panicked");
        }));
        assert!(poisoned.is_err());
        assert!(source.values.is_poisoned());

        source.set("key", "v2");
        let retrieved = source.retrieve("key", None).await.unwrap();
        assert_eq!(retrieved.value(), &json!("v2"));
    }

    #[test]
    fn test_factory_settings() {
        let source = StaticSourceFactory
            .create("static", &json!({"values": {"a": 1}}))
            .unwrap();
        assert!(format!("{:?}", source).contains("StaticSource"));

        assert!(StaticSourceFactory.create("static", &Value::Null).is_ok());
        assert!(StaticSourceFactory.create("static", &json!({"values": 3})).is_err());
    }
}
