//! Config Source Registry
//!
//! Maps source type names to factories and builds the live sources declared
//! in the top-level `config_sources` section of a document.
//!
//! Each key of the section names one source instance. The part before the
//! first `/` selects the factory, so `vault` and `vault/backup` are two
//! distinct instances of the same type:
//!
//! ```yaml
//! config_sources:
//!   vault:
//!     address: https://vault.example.com
//!   vault/backup:
//!     address: ${BACKUP_VAULT_ADDR}
//! ```
//!
//! Settings may reference environment variables. They cannot reference
//! other config sources.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::file::FileSourceFactory;
use super::memory::StaticSourceFactory;
use super::traits::ConfigSourceFactory;
use crate::env::EnvLookup;
use crate::error::BuildError;
use crate::expand::{ConfigSources, Expander};
use crate::resolver::{resolve_value, CONFIG_SOURCES_KEY};

/// Registry of config source factories keyed by type name
#[derive(Clone, Default)]
pub struct Factories {
    factories: HashMap<String, Arc<dyn ConfigSourceFactory>>,
}

impl fmt::Debug for Factories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factories")
            .field("types", &self.type_names())
            .finish()
    }
}

impl Factories {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `static` and `file` types
    pub fn builtin() -> Self {
        Self::new()
            .with_factory(StaticSourceFactory)
            .with_factory(FileSourceFactory)
    }

    /// Add a factory (builder pattern)
    ///
    /// A factory registered under an existing type name replaces it.
    pub fn with_factory<F: ConfigSourceFactory + 'static>(mut self, factory: F) -> Self {
        self.register(factory);
        self
    }

    /// Add a factory
    pub fn register<F: ConfigSourceFactory + 'static>(&mut self, factory: F) {
        self.factories
            .insert(factory.type_name().to_string(), Arc::new(factory));
    }

    /// Look up the factory for a type name
    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn ConfigSourceFactory>> {
        self.factories.get(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Type name of a `config_sources` key: the part before the first `/`
pub fn source_type(name: &str) -> &str {
    name.split_once('/').map_or(name, |(type_name, _)| type_name)
}

/// Build every source declared in the `config_sources` section of `tree`
///
/// A missing or `null` section yields no sources. Settings have environment
/// references expanded before they reach the factory.
pub async fn build_config_sources(
    tree: &Value,
    factories: &Factories,
    env: &dyn EnvLookup,
) -> Result<ConfigSources, BuildError> {
    let section = match tree.get(CONFIG_SOURCES_KEY) {
        None | Some(Value::Null) => return Ok(ConfigSources::new()),
        Some(Value::Object(section)) => section,
        Some(other) => {
            return Err(BuildError::InvalidSection(format!(
                "expected a map, found {}",
                other
            )))
        }
    };

    let no_sources = ConfigSources::new();
    let mut sources = ConfigSources::new();

    for (name, settings) in section {
        let type_name = source_type(name);
        let factory = factories.get(type_name).ok_or_else(|| BuildError::UnknownType {
            name: name.clone(),
            type_name: type_name.to_string(),
        })?;

        let mut expander = Expander::new(&no_sources, env);
        let settings = resolve_value(settings.clone(), &mut expander)
            .await
            .map_err(|source| BuildError::Settings {
                name: name.clone(),
                source,
            })?;

        let source = factory
            .create(name, &settings)
            .map_err(|source| BuildError::Create {
                name: name.clone(),
                source,
            })?;

        tracing::debug!(source = %name, type_name = %type_name, "Created config source");
        sources.insert(name.clone(), source);
    }

    Ok(sources)
}
