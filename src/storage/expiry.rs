//! Background Expiration Reaper
//!
//! Expired keys are invisible to reads as soon as their deadline passes, but
//! they keep occupying engine storage until something deletes them. The
//! reaper is that something: a Tokio task that drains the engine's expiry
//! index in batches.
//!
//! ## Design
//!
//! Each round runs on Tokio's blocking pool and:
//! 1. Mints a version
//! 2. Fetches up to `batch_limit` keys whose deadline has passed
//! 3. Deletes them through [`CommandProcessor::del`] with the minted version
//! 4. Goes straight to the next round if the batch was non-empty, otherwise
//!    sleeps for `idle_interval`
//!
//! Deleting through the command layer means a key that was rewritten
//! between the fetch and the delete carries a newer version than the one
//! the reaper minted, and survives.

use crate::commands::CommandProcessor;
use crate::storage::{mint_version, now_ms, Engine, MetaData, Version};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the expiration reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Pause after a round that found nothing (default: 50ms)
    pub idle_interval: Duration,

    /// Maximum keys fetched and deleted per round (default: 1000)
    pub batch_limit: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(50),
            batch_limit: 1000,
        }
    }
}

/// A handle to the running reaper.
///
/// When this handle is dropped, the reaper task is told to stop.
#[derive(Debug)]
pub struct ExpirationReaper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirationReaper {
    /// Starts the reaper as a background task. Must be called from within a
    /// Tokio runtime.
    pub fn start<E: Engine>(processor: Arc<CommandProcessor<E>>, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(reaper_loop(processor, config, shutdown_rx));

        info!(
            idle_interval_ms = config.idle_interval.as_millis() as u64,
            batch_limit = config.batch_limit,
            "Expiration reaper started"
        );

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop after its current round.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Expiration reaper stopped");
    }

    /// Stops the reaper and waits for its task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiration reaper task failed");
            }
        }
    }
}

impl Drop for ExpirationReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop<E: Engine>(
    processor: Arc<CommandProcessor<E>>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            debug!("Expiration reaper received shutdown signal");
            return;
        }

        // engine calls block, so the round runs off the async workers
        let round = {
            let processor = Arc::clone(&processor);
            tokio::task::spawn_blocking(move || reap_round(&processor, config.batch_limit)).await
        };
        let fetched = match round {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Expiration round failed");
                0
            }
        };

        if fetched == 0 {
            tokio::select! {
                _ = tokio::time::sleep(config.idle_interval) => {}
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        debug!("Expiration reaper received shutdown signal");
                        return;
                    }
                }
            }
            continue;
        }

        tokio::task::yield_now().await;
    }
}

/// Runs one fetch-and-delete round. Returns how many keys were fetched.
fn reap_round<E: Engine>(processor: &CommandProcessor<E>, batch_limit: usize) -> usize {
    let version = mint_version();
    let keys = match processor.fetch_expired(now_ms(), batch_limit) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "Failed to fetch expired keys");
            return 0;
        }
    };
    if keys.is_empty() {
        return 0;
    }

    let reclaimed = reclaim(processor, &keys, version);
    debug!(
        fetched = keys.len(),
        reclaimed = reclaimed,
        "Expired keys reclaimed"
    );
    keys.len()
}

/// Deletes `keys` at `version`. A key rewritten since it was fetched holds
/// a newer version and is kept. Returns how many keys went.
fn reclaim<E: Engine>(processor: &CommandProcessor<E>, keys: &[Bytes], version: Version) -> usize {
    let versions = vec![version; keys.len()];
    let (_, statuses) = processor.del(keys, &versions, &MetaData::default());
    statuses.iter().filter(|s| s.is_ok()).count()
}
