//! Tree Resolver
//!
//! Walks a configuration tree, expands every string leaf and drops the
//! top-level `config_sources` section. [`Resolver`] wraps the walk into a
//! full pass: it builds the declared sources, resolves the tree, and hands
//! back the resolved configuration together with the change subscription
//! and the closer for everything the pass touched.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_resolver_core::{Factories, Resolver};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let tree: serde_json::Value = serde_yaml::from_str(
//!     r#"
//! config_sources:
//!   file: { path: /etc/app/secrets.yaml }
//! database:
//!   password: $file:database.password
//!   host: ${DB_HOST}
//! "#,
//! )?;
//!
//! let resolved = Resolver::new(Factories::builtin()).resolve(tree).await?;
//! println!("{}", resolved.config);
//! resolved.closer.close().await?;
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::closer::Closer;
use crate::config::ResolverConfig;
use crate::env::{EnvLookup, ProcessEnv};
use crate::error::{ResolveError, ResolveFailure, Result};
use crate::expand::{ConfigSources, Expander};
use crate::providers::{build_config_sources, Factories};
use crate::watch::ChangeSubscription;

/// Top-level key declaring the config sources of a document
pub const CONFIG_SOURCES_KEY: &str = "config_sources";

/// Resolve every string leaf of `tree`, then drop `config_sources`
///
/// Map keys are visited in sorted order. The first error aborts the walk.
pub async fn resolve_tree(tree: Value, expander: &mut Expander<'_>) -> std::result::Result<Value, ResolveError> {
    let mut resolved = resolve_value(tree, expander).await?;
    if let Value::Object(map) = &mut resolved {
        map.remove(CONFIG_SOURCES_KEY);
    }
    Ok(resolved)
}

pub(crate) fn resolve_value<'e, 'a: 'e>(
    value: Value,
    expander: &'e mut Expander<'a>,
) -> BoxFuture<'e, std::result::Result<Value, ResolveError>> {
    async move {
        match value {
            Value::String(raw) => expander.expand(&raw).await,
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(resolve_value(item, expander).await?);
                }
                Ok(Value::Array(resolved))
            }
            Value::Object(entries) => {
                let mut resolved = Map::new();
                for (key, item) in entries {
                    let item = resolve_value(item, expander).await?;
                    resolved.insert(key, item);
                }
                Ok(Value::Object(resolved))
            }
            scalar => Ok(scalar),
        }
    }
    .boxed()
}

/// Output of a successful pass
#[derive(Debug)]
pub struct Resolved {
    /// The configuration with every reference expanded
    pub config: Value,
    /// Releases the sources touched by the pass
    pub closer: Closer,
    /// Fires once when any touched source reports a change
    pub changes: ChangeSubscription,
}

/// Entry point for resolution passes
///
/// A resolver is reusable: each call to [`Resolver::resolve`] is an
/// independent pass with its own closer and subscription. Cancelling the
/// resolver's token aborts pending retrievals and stops the watches of
/// every pass.
pub struct Resolver {
    factories: Factories,
    env: Arc<dyn EnvLookup>,
    config: ResolverConfig,
    cancel: CancellationToken,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("factories", &self.factories)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Factories::builtin())
    }
}

impl Resolver {
    /// Create a resolver reading the process environment
    pub fn new(factories: Factories) -> Self {
        Self {
            factories,
            env: Arc::new(ProcessEnv),
            config: ResolverConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `env` for environment references (builder pattern)
    pub fn with_env<E: EnvLookup + 'static>(mut self, env: E) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Replace the configuration (builder pattern)
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Tie every pass to `cancel` (builder pattern)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registered factories
    pub fn factories(&self) -> &Factories {
        &self.factories
    }

    /// Current configuration
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Build the sources declared in `tree` and resolve it
    pub async fn resolve(&self, tree: Value) -> Result<Resolved> {
        let sources = build_config_sources(&tree, &self.factories, self.env.as_ref()).await?;
        Ok(self.resolve_with_sources(tree, &sources).await?)
    }

    /// Resolve `tree` against already built sources
    ///
    /// On failure the returned [`ResolveFailure`] carries a closer for the
    /// sources touched before the error.
    pub async fn resolve_with_sources(
        &self,
        tree: Value,
        sources: &ConfigSources,
    ) -> std::result::Result<Resolved, ResolveFailure> {
        let pass = self.cancel.child_token();
        let mut expander = Expander::new(sources, self.env.as_ref()).with_cancellation(pass.clone());

        let outcome = resolve_tree(tree, &mut expander).await;
        let mut entries = expander.into_touched().into_entries();
        let timeout = self.config.close_timeout();

        let config = match outcome {
            Ok(config) => config,
            Err(error) => {
                tracing::debug!(error = %error, touched = entries.len(), "Resolution failed");
                return Err(ResolveFailure {
                    error,
                    closer: Closer::new(entries, pass, timeout),
                });
            }
        };

        let changes = if self.config.watch_for_updates {
            let watches = entries
                .iter_mut()
                .map(|entry| (entry.name.clone(), std::mem::take(&mut entry.watches)))
                .collect();
            ChangeSubscription::start(watches, pass.clone())
        } else {
            ChangeSubscription::stopped()
        };

        tracing::debug!(touched = entries.len(), "Resolved configuration");

        Ok(Resolved {
            config,
            closer: Closer::new(entries, pass, timeout),
            changes,
        })
    }
}
