//! One-shot subscription fan-out
//!
//! [`subscribe_once`] starts one task per target, optionally spacing
//! task starts on a fixed interval and gating each target behind a
//! distributed lock when clustering is enabled. Every target is always
//! attempted; failures are aggregated after all tasks finish rather
//! than aborting the run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use virta_core::{PluginError, TargetConfig};

use crate::cluster::{lock_key, Clustering, Locker, NoopLocker};
use crate::error::{Error, Result};

/// Options for a [`subscribe_once`] run
#[derive(Clone)]
pub struct SubscribeOpts {
    /// Fixed interval between task starts; `None` starts all at once
    pub start_interval: Option<Duration>,
    /// Cluster membership; enables lock-key namespacing
    pub clustering: Option<Clustering>,
    /// Lock backend gating target ownership
    pub locker: Arc<dyn Locker>,
}

impl Default for SubscribeOpts {
    fn default() -> Self {
        Self {
            start_interval: None,
            clustering: None,
            locker: Arc::new(NoopLocker),
        }
    }
}

enum Outcome {
    Done(String, std::result::Result<(), PluginError>),
    Skipped,
}

/// Subscribe to every target once, aggregating failures
///
/// `subscribe` builds the per-target future; each runs on its own task.
/// A target whose lock is held by another instance is skipped and does
/// not count as a failure.
///
/// # Errors
/// Returns [`Error::SubscribeRun`] when any target's task failed, after
/// all targets have been attempted.
pub async fn subscribe_once<F, Fut>(
    targets: &[TargetConfig],
    opts: SubscribeOpts,
    subscribe: F,
) -> Result<()>
where
    F: Fn(&TargetConfig) -> Fut,
    Fut: Future<Output = std::result::Result<(), PluginError>> + Send + 'static,
{
    let total = targets.len();
    if total == 0 {
        return Ok(());
    }
    // Sized to the target count so no task ever blocks on reporting.
    let (tx, mut rx) = mpsc::channel(total);

    let mut ticker = opts.start_interval.map(tokio::time::interval);
    for target in targets {
        if let Some(ticker) = &mut ticker {
            // First tick fires immediately, later ones pace the starts.
            ticker.tick().await;
        }
        let fut = subscribe(target);
        let name = target.name.clone();
        let key = lock_key(opts.clustering.as_ref(), &name);
        let locker = opts.locker.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match locker.lock(&key).await {
                Ok(false) => {
                    tracing::info!(target = %name, key = %key, "lock held elsewhere, skipping");
                    Outcome::Skipped
                }
                Err(err) => Outcome::Done(name, Err(err)),
                Ok(true) => {
                    let result = fut.await;
                    if let Err(err) = locker.unlock(&key).await {
                        tracing::warn!(target = %name, key = %key, error = %err, "unlock failed");
                    }
                    Outcome::Done(name, result)
                }
            };
            // Receiver outlives every sender; a send only fails if the
            // caller was dropped, in which case nobody is listening.
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut failed = 0usize;
    let mut attempted = 0usize;
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Outcome::Done(name, Err(err)) => {
                tracing::error!(target = %name, error = %err, "target subscription failed");
                failed += 1;
                attempted += 1;
            }
            Outcome::Done(_, Ok(())) => attempted += 1,
            Outcome::Skipped => {}
        }
    }
    tracing::info!(total, attempted, failed, "subscription run finished");
    if failed > 0 {
        return Err(Error::SubscribeRun { failed, total });
    }
    Ok(())
}

/// Await a shutdown future, bounding how long it may take
///
/// # Errors
/// Returns [`Error::ShutdownTimeout`] when the deadline passes first.
pub async fn shutdown_with_timeout<F: Future>(deadline: Duration, shutdown: F) -> Result<F::Output> {
    tokio::time::timeout(deadline, shutdown)
        .await
        .map_err(|_| Error::ShutdownTimeout(deadline))
}
