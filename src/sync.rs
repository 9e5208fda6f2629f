//! Chain synchronization for bookledger
//!
//! This module reconciles the local chain with the chains held by known
//! peers:
//! - Concurrent fetch of every peer's chain, each under its own timeout
//! - Longest-valid-chain selection with a strictly-longer requirement
//! - Atomic replacement of the local chain
//! - Propagation of pending transactions to peers
//! - Sync state and statistics tracking

use crate::blockchain::{check_chain, Block, Ledger};
use crate::error::ChainError;
use crate::network::{ChainTransport, PeerRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Default per-peer fetch timeout.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Sync statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub resolutions_run: u64,
    pub chains_replaced: u64,
    pub peer_failures: u64,
    pub chains_rejected: u64,
    pub transactions_propagated: u64,
    #[serde(skip)]
    pub last_resolution: Option<Instant>,
}

/// Sync state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced,
    /// The last resolution reached no peer at all.
    Failed,
}

/// Outcome of one resolution round.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub replaced: bool,
    /// Peer whose chain was adopted, when one was.
    pub source: Option<String>,
    pub chain: Vec<Block>,
}

/// Outcome of pushing the pending pool to peers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropagationReport {
    pub transactions: usize,
    pub accepted: Vec<String>,
    pub failed: Vec<String>,
}

/// Picks the chain to adopt from fetched candidates.
///
/// Only chains strictly longer than `local_len` that pass validation qualify.
/// Among qualifying chains the longest wins; equal lengths fall back to the
/// lexicographically smallest tail hash, then to the peer id, so the choice
/// never depends on the order candidates arrive in.
pub fn select_best_chain(
    local_len: usize,
    candidates: Vec<(String, Vec<Block>)>,
) -> Option<(String, Vec<Block>)> {
    select_with_rejections(local_len, candidates).0
}

/// [`select_best_chain`] plus the number of longer chains that failed
/// validation.
fn select_with_rejections(
    local_len: usize,
    candidates: Vec<(String, Vec<Block>)>,
) -> (Option<(String, Vec<Block>)>, usize) {
    let mut rejected = 0;
    let winner = candidates
        .into_iter()
        .filter(|(peer, chain)| {
            if chain.len() <= local_len {
                return false;
            }
            if let Err(e) = check_chain(chain) {
                warn!(peer = %peer, length = chain.len(), error = %e, "sync.chain_rejected");
                rejected += 1;
                return false;
            }
            true
        })
        .map(|(peer, chain)| {
            let tail = chain.last().and_then(|block| block.hash().ok()).unwrap_or_default();
            (peer, chain, tail)
        })
        .min_by(|(peer_a, chain_a, tail_a), (peer_b, chain_b, tail_b)| {
            chain_b
                .len()
                .cmp(&chain_a.len())
                .then_with(|| tail_a.cmp(tail_b))
                .then_with(|| peer_a.cmp(peer_b))
        })
        .map(|(peer, chain, _)| (peer, chain));
    (winner, rejected)
}

/// Node synchronizer
pub struct NodeSynchronizer {
    ledger: Arc<RwLock<Ledger>>,
    peers: PeerRegistry,
    transport: Arc<dyn ChainTransport>,
    peer_timeout: Duration,
    /// This node's own identifier; skipped when pushing transactions.
    local_id: Option<String>,
    sync_state: Arc<RwLock<SyncState>>,
    stats: Arc<RwLock<SyncStats>>,
}

impl NodeSynchronizer {
    pub fn new(
        ledger: Arc<RwLock<Ledger>>,
        peers: PeerRegistry,
        transport: Arc<dyn ChainTransport>,
    ) -> Self {
        Self {
            ledger,
            peers,
            transport,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            local_id: None,
            sync_state: Arc::new(RwLock::new(SyncState::Idle)),
            stats: Arc::new(RwLock::new(SyncStats::default())),
        }
    }

    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    pub fn with_local_id(mut self, id: impl Into<String>) -> Self {
        self.local_id = Some(id.into());
        self
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn ledger(&self) -> &Arc<RwLock<Ledger>> {
        &self.ledger
    }

    /// Get current sync state
    pub async fn get_sync_state(&self) -> SyncState {
        *self.sync_state.read().await
    }

    /// Get sync statistics
    pub async fn get_stats(&self) -> SyncStats {
        self.stats.read().await.clone()
    }

    async fn set_sync_state(&self, state: SyncState) {
        *self.sync_state.write().await = state;
    }

    /// Fetches every peer's chain concurrently, each bounded by the peer
    /// timeout. Failures are recorded against the peer and skipped.
    async fn fetch_all(&self, peers: Vec<String>) -> Vec<(String, Vec<Block>)> {
        let mut tasks = JoinSet::new();
        for peer in peers {
            let transport = self.transport.clone();
            let timeout = self.peer_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, transport.fetch_chain(&peer)).await {
                    Ok(result) => result,
                    Err(_) => Err(ChainError::TransportError(format!(
                        "{} timed out after {} ms",
                        peer,
                        timeout.as_millis()
                    ))),
                };
                (peer, result)
            });
        }

        let mut candidates = Vec::new();
        let mut failures = 0u64;
        while let Some(joined) = tasks.join_next().await {
            let (peer, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "sync.fetch_task_failed");
                    failures += 1;
                    continue;
                }
            };
            match result {
                Ok(chain) => {
                    debug!(peer = %peer, length = chain.len(), "sync.chain_fetched");
                    self.peers.record_success(&peer);
                    candidates.push((peer, chain));
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "sync.peer_skipped");
                    self.peers.record_failure(&peer);
                    failures += 1;
                }
            }
        }

        self.stats.write().await.peer_failures += failures;
        candidates
    }

    /// Runs one resolution round against every registered peer.
    ///
    /// The ledger lock is never held while peers are contacted: the local
    /// length is read up front, and the write lock is taken only to re-check
    /// length and swap. A local chain that grew past the winner in the
    /// meantime is kept.
    pub async fn resolve(&self) -> Resolution {
        self.set_sync_state(SyncState::Syncing).await;

        let local_len = self.ledger.read().await.len();
        let peers = self.peers.peers();
        let peer_count = peers.len();

        let candidates = self.fetch_all(peers).await;
        let reached = candidates.len();
        let (winner, rejected) = select_with_rejections(local_len, candidates);

        let (replaced, source, chain) = {
            let mut ledger = self.ledger.write().await;
            let mut source = None;
            if let Some((peer, chain)) = winner {
                let length = chain.len();
                match ledger.replace_chain(chain) {
                    Ok(()) => {
                        info!(peer = %peer, length, "sync.chain_replaced");
                        source = Some(peer);
                    }
                    Err(e) => info!(peer = %peer, error = %e, "sync.replacement_skipped"),
                }
            }
            (source.is_some(), source, ledger.blocks().to_vec())
        };

        {
            let mut stats = self.stats.write().await;
            stats.resolutions_run += 1;
            stats.chains_rejected += rejected as u64;
            if replaced {
                stats.chains_replaced += 1;
            }
            stats.last_resolution = Some(Instant::now());
        }

        let state = if peer_count > 0 && reached == 0 {
            SyncState::Failed
        } else {
            SyncState::Synced
        };
        self.set_sync_state(state).await;

        if !replaced {
            debug!(peers = peer_count, reached, length = chain.len(), "sync.no_replacement");
        }

        Resolution {
            replaced,
            source,
            chain,
        }
    }

    /// Pushes every pending transaction to each peer other than this node,
    /// then asks each peer to seal a block.
    ///
    /// The local pool is left untouched. Peers that fail any step are
    /// reported and skipped.
    pub async fn propagate_pending(&self) -> PropagationReport {
        let pending = self.ledger.read().await.pending().get_all_transactions();
        let mut report = PropagationReport {
            transactions: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return report;
        }

        let pending = Arc::new(pending);
        let mut tasks = JoinSet::new();
        for peer in self.peers.peers() {
            if self.local_id.as_deref() == Some(peer.as_str()) {
                continue;
            }
            let transport = self.transport.clone();
            let pending = pending.clone();
            let timeout = self.peer_timeout;
            tasks.spawn(async move {
                let push = async {
                    for tx in pending.iter() {
                        transport.submit_transaction(&peer, tx).await?;
                    }
                    transport.request_block(&peer).await
                };
                let result = match tokio::time::timeout(timeout, push).await {
                    Ok(result) => result,
                    Err(_) => Err(ChainError::TransportError(format!("{} timed out", peer))),
                };
                (peer, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(()))) => report.accepted.push(peer),
                Ok((peer, Err(e))) => {
                    warn!(peer = %peer, error = %e, "sync.propagation_failed");
                    self.peers.record_failure(&peer);
                    report.failed.push(peer);
                }
                Err(e) => warn!(error = %e, "sync.propagation_task_failed"),
            }
        }
        report.accepted.sort();
        report.failed.sort();

        self.stats.write().await.transactions_propagated +=
            (report.transactions * report.accepted.len()) as u64;
        info!(
            transactions = report.transactions,
            accepted = report.accepted.len(),
            failed = report.failed.len(),
            "sync.propagated"
        );
        report
    }

    /// Runs [`NodeSynchronizer::resolve`] every `interval` until the returned
    /// handle is aborted. Aborting mid-round leaves the ledger untouched
    /// unless the swap had already happened.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let resolution = self.resolve().await;
                debug!(
                    replaced = resolution.replaced,
                    length = resolution.chain.len(),
                    "sync.periodic_round"
                );
            }
        })
    }
}
