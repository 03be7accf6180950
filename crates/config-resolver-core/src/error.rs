//! Error types for resolution passes
//!
//! Parse and resolve errors abort a pass. Build errors happen before a pass
//! starts, while the `config_sources` section is turned into live sources.
//! Close errors are aggregated and reported without affecting control flow.

use thiserror::Error;

use crate::closer::Closer;
use crate::providers::ConfigSourceError;

/// Malformed reference or invocation syntax
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `:` separates the source name from the selector
    #[error("invalid config source invocation {invocation:?}: missing ':' before the selector")]
    MissingSelector { invocation: String },

    /// Nothing before the `:`
    #[error("invalid config source invocation {invocation:?}: empty config source name")]
    EmptyName { invocation: String },

    /// Query key with characters outside `[A-Za-z0-9_.-]`
    #[error("invalid parameter name {key:?} in {invocation:?}")]
    InvalidParamName { key: String, invocation: String },

    /// Percent-decoding produced invalid UTF-8
    #[error("invalid encoding in parameter {key:?}: {reason}")]
    InvalidEncoding { key: String, reason: String },

    /// `${` without a matching `}`
    #[error("unterminated '${{' at offset {offset} in {raw:?}")]
    UnterminatedDelimiter { raw: String, offset: usize },

    /// `$` that does not start a valid reference
    #[error("invalid '$' reference at offset {offset} in {raw:?}; use '$$' for a literal '$'")]
    InvalidReference { raw: String, offset: usize },

    /// `${}` or `${  }`
    #[error("empty '${{}}' reference in {raw:?}")]
    EmptyReference { raw: String },
}

/// Errors that abort a resolution pass
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A name in invocation position has no registered source
    #[error("config source {name:?} not found; if this was intended to be an environment variable use \"${{{name}}}\" instead")]
    UnknownConfigSource { name: String },

    /// The source failed to retrieve a value
    #[error("config source {name:?} failed to retrieve {selector:?}: {source}")]
    Retrieve {
        name: String,
        selector: String,
        #[source]
        source: ConfigSourceError,
    },

    /// The pass cancellation token fired
    #[error("resolution cancelled")]
    Cancelled,
}

/// Errors building sources from the `config_sources` section
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("unknown config_sources type {type_name:?} for {name:?}")]
    UnknownType { name: String, type_name: String },

    #[error("failed to create config source {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: ConfigSourceError,
    },

    #[error("failed to expand settings of config source {name}: {source}")]
    Settings {
        name: String,
        #[source]
        source: ResolveError,
    },

    #[error("invalid config_sources section: {0}")]
    InvalidSection(String),
}

/// A failed pass together with the closer for the sources it touched
///
/// Sources invoked before the failure are still open; call
/// [`Closer::close`] to release them.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ResolveFailure {
    #[source]
    pub error: ResolveError,
    pub closer: Closer,
}

/// Top-level error of [`Resolver::resolve`](crate::Resolver::resolve)
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Resolve(#[from] ResolveFailure),
}

impl Error {
    /// Closer for the sources touched before the failure
    ///
    /// Build failures happen before any source is invoked and return an
    /// empty closer.
    pub fn closer(&self) -> Closer {
        match self {
            Error::Build(_) => Closer::empty(),
            Error::Resolve(failure) => failure.closer.clone(),
        }
    }
}

/// Result type for top-level resolution
pub type Result<T> = std::result::Result<T, Error>;
