//! Node orchestrator: owns the ledger for the lifetime of the process, wires
//! it to the peer registry, synchronizer and API server, and tears everything
//! down on shutdown.

use crate::blockchain::Ledger;
use crate::config::Config;
use crate::error::ChainError;
use crate::network::{ChainTransport, HttpTransport, PeerRegistry};
use crate::sync::{NodeSynchronizer, SyncState};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    Booting,
    Syncing,
    Ready,
    /// Serving, but the bootstrap resolution reached no peer.
    Degraded,
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `level`.
/// Calling it twice is harmless.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub struct Node {
    pub config: Config,
    pub node_id: String,
    pub ledger: Arc<RwLock<Ledger>>,
    pub synchronizer: Arc<NodeSynchronizer>,
    pub state: Arc<RwLock<NodeState>>,
}

impl Node {
    /// Builds a node that talks to peers over HTTP.
    pub fn init(config: Config) -> Result<Self, ChainError> {
        let transport = Arc::new(HttpTransport::new(config.sync.peer_timeout()));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(
        config: Config,
        transport: Arc<dyn ChainTransport>,
    ) -> Result<Self, ChainError> {
        config.validate()?;

        let node_id = config.network.node_id();
        let peers = PeerRegistry::new();
        peers.register_all(&config.network.bootstrap_peers[..])?;

        let ledger = Arc::new(RwLock::new(Ledger::new()));
        let synchronizer = NodeSynchronizer::new(ledger.clone(), peers, transport)
            .with_peer_timeout(config.sync.peer_timeout())
            .with_local_id(node_id.clone());

        info!(node_id = %node_id, bootstrap_peers = config.network.bootstrap_peers.len(), "node.initialized");

        Ok(Self {
            config,
            node_id,
            ledger,
            synchronizer: Arc::new(synchronizer),
            state: Arc::new(RwLock::new(NodeState::Booting)),
        })
    }

    pub async fn state(&self) -> NodeState {
        *self.state.read().await
    }

    async fn set_state(&self, state: NodeState) {
        *self.state.write().await = state;
    }

    /// Runs one resolution against the bootstrap peers and moves the node to
    /// `Ready`, or `Degraded` when no peer answered.
    pub async fn bootstrap_sync(&self) -> NodeState {
        self.set_state(NodeState::Syncing).await;

        let state = if self.synchronizer.peers().is_empty() {
            NodeState::Ready
        } else {
            let resolution = self.synchronizer.resolve().await;
            info!(
                replaced = resolution.replaced,
                length = resolution.chain.len(),
                "node.bootstrap_sync"
            );
            match self.synchronizer.get_sync_state().await {
                SyncState::Failed => NodeState::Degraded,
                _ => NodeState::Ready,
            }
        };

        if state == NodeState::Degraded {
            warn!("node.degraded: no bootstrap peer reachable");
        }
        self.set_state(state).await;
        state
    }

    /// Starts every service and blocks until ctrl-c or the API server exits.
    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        let addr = self.resolve_bind_addr().await?;
        let mut api_task = self.clone().spawn_api(addr);

        self.bootstrap_sync().await;

        let sync_task: Option<JoinHandle<()>> = self.config.sync.interval().map(|interval| {
            info!(interval_secs = interval.as_secs(), "node.periodic_sync_enabled");
            self.synchronizer.clone().spawn_periodic(interval)
        });

        let result = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                info!("node.shutdown_requested");
                signal.map_err(ChainError::from)
            }
            joined = &mut api_task => match joined {
                Ok(result) => result,
                Err(e) => Err(ChainError::IoError(format!("API task failed: {}", e))),
            },
        };

        api_task.abort();
        if let Some(task) = sync_task {
            task.abort();
        }
        if let Err(e) = &result {
            error!(error = %e, "node.stopped_with_error");
        }
        info!(length = self.ledger.read().await.len(), "node.stopped");
        result
    }

    async fn resolve_bind_addr(&self) -> Result<SocketAddr, ChainError> {
        let network = &self.config.network;
        tokio::net::lookup_host((network.host.as_str(), network.api_port))
            .await?
            .next()
            .ok_or_else(|| {
                ChainError::ConfigError(format!("Cannot resolve host {}", network.host))
            })
    }

    #[cfg(feature = "api")]
    fn spawn_api(self: Arc<Self>, addr: SocketAddr) -> JoinHandle<Result<(), ChainError>> {
        let api_node = crate::api::Node::new(self.synchronizer.clone(), self.node_id.clone())
            .with_state(self.state.clone())
            .with_max_peer_failures(self.config.sync.max_peer_failures);

        tokio::spawn(crate::api::run_api_server(Arc::new(api_node), addr))
    }

    #[cfg(not(feature = "api"))]
    fn spawn_api(self: Arc<Self>, _addr: SocketAddr) -> JoinHandle<Result<(), ChainError>> {
        tokio::spawn(async {
            Err(ChainError::ConfigError(
                "API feature not enabled in this build".to_string(),
            ))
        })
    }
}
