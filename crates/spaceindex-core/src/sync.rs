//! The sync loop: one resolve → replay → revalidate pass per tick.
//!
//! ```text
//! Idle ──tick──▶ Resolving ──▶ Replaying ──▶ Idle
//!                    │             │
//!                    └──error──────┴──▶ BackingOff ──retry delay──▶ Resolving
//! ```
//!
//! A pass is never resumed: after a failure the next pass re-derives
//! everything from persisted state. Shutdown is only observed between passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::chain::ChainClient;
use crate::error::IndexerError;
use crate::indexer::{IndexerConfig, SyncState};
use crate::reorg::{HeadResolver, Resolution};
use crate::replay::{BlockReplayer, ReplayReport};
use crate::revalidate::ListingRevalidator;
use crate::store::{BlockStore, ListingStore};

/// Outcome of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// What head resolution found.
    pub resolution: Resolution,
    /// Chain tip height observed at the start of the pass.
    pub tip: u64,
    pub replay: ReplayReport,
}

/// Drives sync passes on a fixed interval until shut down.
pub struct SyncLoop {
    config: IndexerConfig,
    chain: Arc<dyn ChainClient>,
    resolver: HeadResolver,
    replayer: BlockReplayer,
    state: watch::Sender<SyncState>,
}

impl SyncLoop {
    pub fn new(
        config: IndexerConfig,
        chain: Arc<dyn ChainClient>,
        blocks: Arc<dyn BlockStore>,
        listings: Arc<dyn ListingStore>,
    ) -> Self {
        let revalidator =
            ListingRevalidator::new(chain.clone(), listings, config.max_concurrent_names);
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            resolver: HeadResolver::new(chain.clone(), blocks.clone()),
            replayer: BlockReplayer::new(chain.clone(), blocks, revalidator),
            chain,
            config,
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state transitions (e.g. to expose "pass in progress").
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Run a single pass to completion.
    pub async fn run_pass(&self) -> Result<PassReport, IndexerError> {
        self.state.send_replace(SyncState::Resolving);
        let tip = self.chain.tip().await?;
        let resolution = self.resolver.resolve(tip.height).await?;
        let from = resolution.next_height(self.config.from_height);

        tracing::debug!(
            head = ?resolution.head.as_ref().map(|h| h.height),
            from,
            tip = tip.height,
            "synced head resolved"
        );

        self.state.send_replace(SyncState::Replaying);
        let replay = self.replayer.replay(from, tip.height).await?;

        Ok(PassReport {
            resolution,
            tip: tip.height,
            replay,
        })
    }

    /// Run passes until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        self.config.validate()?;
        tracing::info!(
            from_height = self.config.from_height,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting sync loop"
        );

        while !*shutdown.borrow() {
            let delay = self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(SyncState::Stopped);
        tracing::info!("Sync loop stopped");
        Ok(())
    }

    /// One pass with error containment; returns how long to wait next.
    async fn tick(&self) -> Duration {
        match self.run_pass().await {
            Ok(report) => {
                self.state.send_replace(SyncState::Idle);
                if report.replay.blocks > 0 || report.resolution.reorg.is_some() {
                    tracing::info!(
                        from = report.replay.from,
                        synced = ?report.replay.last_committed,
                        tip = report.tip,
                        blocks = report.replay.blocks,
                        listings_checked = report.replay.listings.checked,
                        listings_invalidated = report.replay.listings.invalid,
                        "Sync pass complete"
                    );
                }
                self.config.poll_interval()
            }
            Err(e) => {
                self.state.send_replace(SyncState::BackingOff);
                if e.is_transient() {
                    tracing::warn!(error = %e, "Sync pass failed, retrying");
                } else {
                    tracing::error!(error = %e, "Sync pass failed, retrying");
                }
                self.config.retry_delay()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    #[test]
    fn run_future_is_send() {
        fn spawnable(
            sync: &SyncLoop,
            shutdown: watch::Receiver<bool>,
        ) -> impl Future<Output = Result<(), IndexerError>> + Send + '_ {
            sync.run(shutdown)
        }
        let _ = spawnable;
    }
}
