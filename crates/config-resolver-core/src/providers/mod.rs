//! Config Sources
//!
//! This module defines the capability through which the resolver consumes
//! externally supplied values, the registry that builds sources from the
//! `config_sources` section, and the built-in source types.
//!
//! # Built-in Sources
//!
//! - **static**: Values held in memory, with change signalling
//! - **file**: JSON, TOML and YAML documents on disk, with optional polling
//!
//! Secret stores, vaults and remote key/value backends implement
//! [`ConfigSource`] and register a [`ConfigSourceFactory`].
//!
//! # Example
//!
//! ```rust,ignore
//! use config_resolver_core::providers::{Factories, build_config_sources};
//!
//! let factories = Factories::builtin().with_factory(VaultSourceFactory::default());
//! let sources = build_config_sources(&tree, &factories, &ProcessEnv).await?;
//! ```

pub mod file;
pub mod memory;
pub mod registry;
pub mod traits;

// Re-export core types
pub use traits::{
    CloseFuture, ConfigSource, ConfigSourceError, ConfigSourceFactory, Retrieved, SourceResult,
    WatchFuture,
};
pub use registry::{build_config_sources, source_type, Factories};

// Re-export source implementations
pub use file::{FileFormat, FileSource, FileSourceConfig, FileSourceFactory};
pub use memory::{StaticSource, StaticSourceConfig, StaticSourceFactory};
