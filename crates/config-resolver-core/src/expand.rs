//! Expression Expander
//!
//! Scans a single string value for `$`-triggered tokens and expands them:
//!
//! - `$$` is a literal `$`
//! - `${...}` is a delimited reference; its content is expanded first and is
//!   then either an invocation (`name:selector?params`) or, without `:`, an
//!   environment variable
//! - `$name:selector?params` is a bare invocation; the selector runs to the
//!   next whitespace
//! - `$NAME` is an environment variable (missing variables expand to `""`)
//!
//! A string that is exactly one token keeps the token's native value, so
//! `"$vault:port"` can resolve to the integer `5432`. Anything else is
//! stringified and concatenated.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::env::EnvLookup;
use crate::error::{ParseError, ResolveError};
use crate::invocation::{parse_invocation, Invocation};
use crate::providers::ConfigSource;
use crate::touched::TouchedSources;

/// Live sources of a pass, keyed by name (`type` or `type/variant`)
pub type ConfigSources = HashMap<String, Arc<dyn ConfigSource>>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Env(String),
    Delimited(String),
    Invocation { name: String, rest: String },
}

/// Expands references in string values against a set of sources
///
/// The expander records every source it invokes; after expansion the
/// touched set is taken with [`Expander::into_touched`] to build the change
/// multiplexer and the closer.
pub struct Expander<'a> {
    sources: &'a ConfigSources,
    env: &'a dyn EnvLookup,
    cancel: CancellationToken,
    touched: TouchedSources,
}

impl<'a> Expander<'a> {
    /// Create an expander over `sources` and `env`
    pub fn new(sources: &'a ConfigSources, env: &'a dyn EnvLookup) -> Self {
        Self {
            sources,
            env,
            cancel: CancellationToken::new(),
            touched: TouchedSources::default(),
        }
    }

    /// Abort pending retrievals when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sources touched so far
    pub fn touched(&self) -> &TouchedSources {
        &self.touched
    }

    /// Take the touched sources, consuming the expander
    pub fn into_touched(self) -> TouchedSources {
        self.touched
    }

    /// Expand every reference in `raw`
    ///
    /// A bare invocation's selector ends at the next whitespace, so
    /// `"$src:a b"` expands to the value of `a` followed by `" b"`.
    pub fn expand<'s>(&'s mut self, raw: &'s str) -> BoxFuture<'s, Result<Value, ResolveError>> {
        async move {
            let segments = tokenize(raw)?;
            let collapse = segments.len() == 1 && !matches!(segments[0], Segment::Literal(_));

            let mut out = String::with_capacity(raw.len());
            for segment in segments {
                let value = match segment {
                    Segment::Literal(text) => {
                        out.push_str(&text);
                        continue;
                    }
                    Segment::Env(name) => Value::String(self.env_value(&name)),
                    Segment::Delimited(content) => self.expand_delimited(raw, &content).await?,
                    Segment::Invocation { name, rest } => {
                        let rest = stringify(&self.expand(&rest).await?);
                        let invocation = parse_invocation(&format!("{}:{}", name, rest))?;
                        self.invoke(invocation).await?
                    }
                };
                if collapse {
                    return Ok(value);
                }
                out.push_str(&stringify(&value));
            }
            Ok(Value::String(out))
        }
        .boxed()
    }

    async fn expand_delimited(&mut self, raw: &str, content: &str) -> Result<Value, ResolveError> {
        let expanded = stringify(&self.expand(content).await?);
        if expanded.contains(':') {
            let invocation = parse_invocation(&expanded)?;
            return self.invoke(invocation).await;
        }

        let name = expanded.trim();
        if name.is_empty() {
            return Err(ParseError::EmptyReference {
                raw: raw.to_string(),
            }
            .into());
        }
        Ok(Value::String(self.env_value(name)))
    }

    async fn invoke(&mut self, invocation: Invocation) -> Result<Value, ResolveError> {
        let source = self.sources.get(&invocation.name).cloned().ok_or_else(|| {
            ResolveError::UnknownConfigSource {
                name: invocation.name.clone(),
            }
        })?;

        // Touch first: a source that fails to retrieve still has to be closed.
        self.touched.touch(&invocation.name, &source);

        tracing::debug!(
            source = %invocation.name,
            selector = %invocation.selector,
            "Retrieving from config source"
        );

        let retrieved = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ResolveError::Cancelled),
            retrieved = source.retrieve(&invocation.selector, invocation.params.as_ref()) => retrieved,
        };

        let retrieved = retrieved.map_err(|e| ResolveError::Retrieve {
            name: invocation.name.clone(),
            selector: invocation.selector.clone(),
            source: e,
        })?;

        let (value, watch, close) = retrieved.into_parts();
        self.touched.retain(&invocation.name, watch, close);
        Ok(value)
    }

    fn env_value(&self, name: &str) -> String {
        self.env.get(name).unwrap_or_default()
    }
}

/// Text form of a value when concatenated with other text
///
/// `null` contributes nothing; maps and sequences are rendered as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    end
}

/// Extend an identifier over `/identifier` segments
fn scan_qualified(bytes: &[u8], mut end: usize) -> usize {
    while end + 1 < bytes.len() && bytes[end] == b'/' && is_ident_byte(bytes[end + 1]) {
        end = scan_ident(bytes, end + 1);
    }
    end
}

/// Index of the `}` closing a `${` whose content starts at `start`
fn find_closing_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = start;
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'$', Some(b'$')) => i += 2,
            (b'$', Some(b'{')) => {
                depth += 1;
                i += 2;
            }
            (b'}', _) => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// End of a bare selector: the next ASCII whitespace outside `${...}`
fn scan_selector(raw: &str, start: usize) -> Result<usize, ParseError> {
    let bytes = raw.as_bytes();
    let mut i = start;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let close = find_closing_brace(bytes, i + 2).ok_or_else(|| ParseError::UnterminatedDelimiter {
                raw: raw.to_string(),
                offset: i,
            })?;
            i = close + 1;
        } else {
            i += 1;
        }
    }
    Ok(i)
}

fn tokenize(raw: &str) -> Result<Vec<Segment>, ParseError> {
    let bytes = raw.as_bytes();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            let next = raw[i..].find('$').map_or(raw.len(), |offset| i + offset);
            literal.push_str(&raw[i..next]);
            i = next;
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'$') => {
                literal.push('$');
                i += 2;
            }
            Some(b'{') => {
                let close = find_closing_brace(bytes, i + 2).ok_or_else(|| ParseError::UnterminatedDelimiter {
                    raw: raw.to_string(),
                    offset: i,
                })?;
                flush_literal(&mut literal, &mut segments);
                segments.push(Segment::Delimited(raw[i + 2..close].to_string()));
                i = close + 1;
            }
            Some(&b) if is_ident_byte(b) => {
                let ident_end = scan_ident(bytes, i + 1);
                let name_end = scan_qualified(bytes, ident_end);
                flush_literal(&mut literal, &mut segments);

                if bytes.get(name_end) == Some(&b':') {
                    let selector_end = scan_selector(raw, name_end + 1)?;
                    segments.push(Segment::Invocation {
                        name: raw[i + 1..name_end].to_string(),
                        rest: raw[name_end + 1..selector_end].to_string(),
                    });
                    i = selector_end;
                } else {
                    // Only the leading identifier names the variable; any
                    // `/suffix` stays literal.
                    segments.push(Segment::Env(raw[i + 1..ident_end].to_string()));
                    i = ident_end;
                }
            }
            _ => {
                return Err(ParseError::InvalidReference {
                    raw: raw.to_string(),
                    offset: i,
                })
            }
        }
    }

    flush_literal(&mut literal, &mut segments);
    Ok(segments)
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}
