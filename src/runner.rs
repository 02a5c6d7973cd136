//! Fixed-size worker pool that executes (domain, provider) work units.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──recv──► Dispatched ──fetch──► Executing ──done──► Idle
//!   │                                                        │
//!   └──── work queue closed / cancellation ────► Stopped ◄───┘
//! ```
//!
//! Workers share one work queue and pull units as they become free, so
//! domains and providers interleave freely. A failed fetch is reported
//! through the error hook and never affects any other unit.

use crate::error::ProviderError;
use crate::models::{UrlRecord, Work};
use crate::providers::Provider;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

/// Called with `(provider, domain, error)` whenever a fetch fails.
pub type ErrorHook = Arc<dyn Fn(&str, &str, &ProviderError) + Send + Sync>;

/// The default hook: log the failure and carry on.
pub fn log_fetch_error() -> ErrorHook {
    Arc::new(|provider: &str, domain: &str, err: &ProviderError| {
        warn!(provider, domain, error = %err, "fetch failed");
    })
}

pub struct Runner {
    threads: usize,
    cancel: CancellationToken,
    on_error: ErrorHook,
    workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("threads", &self.threads)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Runner {
    /// Create a pool of `threads` workers (at least one) sharing `cancel`.
    pub fn new(threads: usize, cancel: CancellationToken) -> Self {
        Self {
            threads: threads.max(1),
            cancel,
            on_error: log_fetch_error(),
            workers: Vec::new(),
        }
    }

    /// Replace the fetch error hook.
    #[cfg(test)]
    pub fn with_error_hook(mut self, on_error: ErrorHook) -> Self {
        self.on_error = on_error;
        self
    }

    /// Spawn the workers.
    ///
    /// Each worker holds a clone of `results`; the channel closes once every
    /// worker has stopped and the caller has dropped its own sender.
    pub fn start<P>(&mut self, work: Receiver<Work<P>>, results: Sender<UrlRecord>)
    where
        P: Provider + 'static,
    {
        let queue = Arc::new(Mutex::new(work));
        for id in 0..self.threads {
            let worker = worker(
                id,
                Arc::clone(&queue),
                results.clone(),
                self.cancel.clone(),
                Arc::clone(&self.on_error),
            );
            self.workers.push(tokio::spawn(worker));
        }
        debug!(threads = self.threads, "workers started");
    }

    /// Trigger cancellation for every worker and in-flight fetch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for every worker to stop.
    pub async fn wait(&mut self) {
        for outcome in join_all(self.workers.drain(..)).await {
            if let Err(e) = outcome {
                error!(error = %e, "worker task failed");
            }
        }
    }
}

async fn worker<P>(
    id: usize,
    queue: Arc<Mutex<Receiver<Work<P>>>>,
    results: Sender<UrlRecord>,
    cancel: CancellationToken,
    on_error: ErrorHook,
) where
    P: Provider + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            work = async { queue.lock().await.recv().await } => work,
        };
        let Some(work) = next else {
            break;
        };

        let provider = work.provider.name();
        let span = info_span!("fetch", worker = id, provider, domain = %work.domain);
        let outcome = work
            .provider
            .fetch(&cancel, &work.domain, &results)
            .instrument(span)
            .await;
        if let Err(e) = outcome {
            on_error(provider, &work.domain, &e);
        }
    }
    debug!(worker = id, "worker stopped");
}

/// Queue one work unit per provider for `domain`.
///
/// Returns `false` if cancellation fired or the workers have gone away
/// before every unit could be queued.
pub async fn enqueue<P>(
    queue: &Sender<Work<P>>,
    cancel: &CancellationToken,
    domain: &str,
    providers: &[Arc<P>],
) -> bool {
    for provider in providers {
        let work = Work::new(domain, Arc::clone(provider));
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = queue.send(work) => sent.is_ok(),
        };
        if !sent {
            return false;
        }
    }
    true
}
