//! Lifecycle Aggregator
//!
//! A [`Closer`] releases everything a resolution pass acquired: it stops the
//! change watches, runs the close futures retained from each retrieval, then
//! closes every touched source exactly once. Closing is idempotent and never
//! stops at the first failure.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::providers::{ConfigSourceError, SourceResult};
use crate::touched::TouchedSource;

/// A source that failed to close
#[derive(Error, Debug)]
#[error("{source_name}: {error}")]
pub struct CloseFailure {
    pub source_name: String,
    #[source]
    pub error: ConfigSourceError,
}

/// Every failure collected while closing a pass
#[derive(Error, Debug)]
#[error("failed to close config sources: {}", describe(.failures))]
pub struct CloseError {
    pub failures: Vec<CloseFailure>,
}

fn describe(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

struct Inner {
    cancel: CancellationToken,
    timeout: Option<Duration>,
    source_count: usize,
    pending: Mutex<Option<Vec<TouchedSource>>>,
    closed: AtomicBool,
}

/// Releases the sources touched by a resolution pass
///
/// Clones share state: whichever clone closes first does the work, later
/// calls return `Ok(())`.
#[derive(Clone, Default)]
pub struct Closer {
    inner: Option<Arc<Inner>>,
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer")
            .field("sources", &self.inner.as_ref().map_or(0, |i| i.source_count))
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Closer {
    pub(crate) fn new(
        entries: Vec<TouchedSource>,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Some(Arc::new(Inner {
                cancel,
                timeout,
                source_count: entries.len(),
                pending: Mutex::new(Some(entries)),
                closed: AtomicBool::new(false),
            })),
        }
    }

    /// A closer with nothing to release
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether no source needs closing
    pub fn is_empty(&self) -> bool {
        self.inner.as_ref().map_or(true, |i| i.source_count == 0)
    }

    /// Whether `close` has completed
    pub fn is_closed(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |i| i.closed.load(Ordering::SeqCst))
    }

    /// Stop watches and close every touched source
    ///
    /// Concurrent callers wait for the first close to finish. All sources
    /// are attempted; failures are reported together.
    pub async fn close(&self) -> Result<(), CloseError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let mut pending = inner.pending.lock().await;
        let Some(entries) = pending.take() else {
            return Ok(());
        };

        inner.cancel.cancel();

        let mut failures = Vec::new();
        let mut sources = Vec::with_capacity(entries.len());

        for entry in entries {
            for close in entry.closes {
                if let Err(error) = inner.bounded(close).await {
                    failures.push(CloseFailure {
                        source_name: entry.name.clone(),
                        error,
                    });
                }
            }
            sources.push((entry.name, entry.source));
        }

        for (name, source) in sources {
            match inner.bounded(source.close()).await {
                Ok(()) => tracing::debug!(source = %name, "Closed config source"),
                Err(error) => failures.push(CloseFailure {
                    source_name: name,
                    error,
                }),
            }
        }

        inner.closed.store(true, Ordering::SeqCst);

        if failures.is_empty() {
            return Ok(());
        }

        let error = CloseError { failures };
        tracing::warn!(error = %error, "Closing config sources failed");
        Err(error)
    }
}

impl Inner {
    async fn bounded<F>(&self, close: F) -> SourceResult<()>
    where
        F: Future<Output = SourceResult<()>>,
    {
        match self.timeout {
            None => close.await,
            Some(limit) => tokio::time::timeout(limit, close).await.map_err(|_| {
                ConfigSourceError::Timeout(format!("close did not complete within {:?}", limit))
            })?,
        }
    }
}
