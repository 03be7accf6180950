//! Core traits for config sources
//!
//! This module defines the capability every config source must implement
//! and the factory trait used to build sources from the `config_sources`
//! section of a document. The resolver only ever talks to sources through
//! these traits, so secret stores, remote key/value backends and vaults all
//! plug in the same way.

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::invocation::Params;

/// Errors that can occur when interacting with config sources
#[derive(Error, Debug)]
pub enum ConfigSourceError {
    /// The requested selector was not found in this source
    #[error("Selector not found: {selector}")]
    NotFound {
        selector: String,
    },

    /// The source is not available or not configured
    #[error("Config source not available: {0}")]
    Unavailable(String),

    /// Configuration or settings error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// I/O error (for file-based sources)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic source error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConfigSourceError {
    /// Create a not-found error for a selector
    pub fn not_found(selector: impl Into<String>) -> Self {
        ConfigSourceError::NotFound {
            selector: selector.into(),
        }
    }
}

/// Result type for config source operations
pub type SourceResult<T> = Result<T, ConfigSourceError>;

/// Future that completes once a retrieved value changes (`Ok`) or the watch
/// itself fails (`Err`).
pub type WatchFuture = BoxFuture<'static, SourceResult<()>>;

/// Future releasing resources held by a single retrieval.
pub type CloseFuture = BoxFuture<'static, SourceResult<()>>;

/// A value returned by [`ConfigSource::retrieve`]
///
/// The value may be any configuration type, not only a string. A source can
/// attach a watch future that completes when the value changes, and a close
/// future releasing per-retrieval resources. Both are handed over to the
/// resolver, which drives them for the lifetime of the resolution pass.
pub struct Retrieved {
    value: Value,
    watch: Option<WatchFuture>,
    close: Option<CloseFuture>,
}

impl Retrieved {
    /// Create a retrieved value without watch or close support
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            watch: None,
            close: None,
        }
    }

    /// Attach a watch future
    pub fn with_watch<F>(mut self, watch: F) -> Self
    where
        F: Future<Output = SourceResult<()>> + Send + 'static,
    {
        self.watch = Some(Box::pin(watch));
        self
    }

    /// Attach a close future
    pub fn with_close<F>(mut self, close: F) -> Self
    where
        F: Future<Output = SourceResult<()>> + Send + 'static,
    {
        self.close = Some(Box::pin(close));
        self
    }

    /// The retrieved value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether a watch future was attached
    pub fn is_watchable(&self) -> bool {
        self.watch.is_some()
    }

    pub(crate) fn into_parts(self) -> (Value, Option<WatchFuture>, Option<CloseFuture>) {
        (self.value, self.watch, self.close)
    }
}

impl fmt::Debug for Retrieved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrieved")
            .field("value", &self.value)
            .field("watch", &self.watch.is_some())
            .field("close", &self.close.is_some())
            .finish()
    }
}

/// Core trait for config sources
///
/// A `ConfigSource` resolves a selector, optionally parameterized, to a
/// value. Implementations must be thread-safe; the resolver shares one
/// instance across every selector that references it within a pass.
///
/// # Retry Policy
///
/// The resolver never retries a failed retrieval. A source that wants
/// retries implements them inside `retrieve`.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync + fmt::Debug {
    /// Retrieve the value identified by `selector`
    ///
    /// # Arguments
    ///
    /// * `selector` - Source-specific key of the value
    /// * `params` - Typed parameters from the invocation query, if any
    async fn retrieve(&self, selector: &str, params: Option<&Params>) -> SourceResult<Retrieved>;

    /// Release resources held by the source
    ///
    /// Called at most once per resolution pass. Default implementation does
    /// nothing.
    async fn close(&self) -> SourceResult<()> {
        Ok(())
    }
}

/// Factory turning a `config_sources` entry into a live source
pub trait ConfigSourceFactory: Send + Sync {
    /// Type name matched against the part of the entry key before `/`
    fn type_name(&self) -> &str;

    /// Build a source named `name` from its settings
    ///
    /// `settings` is `Value::Null` when the entry has no body.
    fn create(&self, name: &str, settings: &Value) -> SourceResult<Arc<dyn ConfigSource>>;
}
