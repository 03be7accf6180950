//! Bookkeeping of the sources invoked during a pass

use std::fmt;
use std::sync::Arc;

use crate::providers::{CloseFuture, ConfigSource, WatchFuture};

/// A source invoked at least once, with the handles of its retrievals
pub(crate) struct TouchedSource {
    pub(crate) name: String,
    pub(crate) source: Arc<dyn ConfigSource>,
    pub(crate) watches: Vec<WatchFuture>,
    pub(crate) closes: Vec<CloseFuture>,
}

/// Distinct sources invoked during one resolution pass
///
/// Deduplicated by name key, not by selector: four selectors against the
/// same source contribute one entry. Entries keep first-touch order.
#[derive(Default)]
pub struct TouchedSources {
    entries: Vec<TouchedSource>,
}

impl TouchedSources {
    /// Number of distinct sources touched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source was touched
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the touched sources in first-touch order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Whether the source `name` was touched
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub(crate) fn touch(&mut self, name: &str, source: &Arc<dyn ConfigSource>) {
        if !self.contains(name) {
            self.entries.push(TouchedSource {
                name: name.to_string(),
                source: Arc::clone(source),
                watches: Vec::new(),
                closes: Vec::new(),
            });
        }
    }

    pub(crate) fn retain(&mut self, name: &str, watch: Option<WatchFuture>, close: Option<CloseFuture>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.watches.extend(watch);
            entry.closes.extend(close);
        }
    }

    pub(crate) fn into_entries(self) -> Vec<TouchedSource> {
        self.entries
    }
}

impl fmt::Debug for TouchedSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TouchedSources")
            .field("sources", &self.names())
            .finish()
    }
}
