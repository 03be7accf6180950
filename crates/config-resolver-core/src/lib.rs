//! Config source reference resolution.
//!
//! This crate expands references embedded in string values of a
//! configuration tree before the tree is used:
//!
//! ```text
//! $vault:db/password?version=3     invocation of the `vault` source
//! ${vault/backup: db/password}     delimited invocation of a named instance
//! $HOME  ${HOME}                   environment variables
//! $$                               a literal `$`
//! ```
//!
//! A string that is exactly one reference takes the native value the source
//! returned, so `"$vault:port"` can resolve to an integer. Sources are
//! declared in the top-level `config_sources` section, which is removed from
//! the resolved tree.
//!
//! # Usage
//!
//! 1. Register source factories in a [`Factories`] registry.
//! 2. Call [`Resolver::resolve`] with the raw tree.
//! 3. Use [`Resolved::config`]; wait on [`Resolved::changes`] to learn when
//!    to resolve again.
//! 4. Call [`Closer::close`] when the configuration is discarded.

pub mod closer;
pub mod config;
pub mod env;
pub mod error;
pub mod expand;
pub mod invocation;
pub mod providers;
pub mod resolver;
mod touched;
pub mod watch;

pub use closer::{CloseError, CloseFailure, Closer};
pub use config::ResolverConfig;
pub use env::{EnvLookup, ProcessEnv};
pub use error::{BuildError, Error, ParseError, ResolveError, ResolveFailure, Result};
pub use expand::{stringify, ConfigSources, Expander};
pub use invocation::{parse_invocation, Invocation, Params};
pub use providers::{
    build_config_sources, ConfigSource, ConfigSourceError, ConfigSourceFactory, Factories, Retrieved,
};
pub use resolver::{resolve_tree, Resolved, Resolver, CONFIG_SOURCES_KEY};
pub use touched::TouchedSources;
pub use watch::{ChangeEvent, ChangeSubscription, WatchError, WatchState};
