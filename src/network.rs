//! Peer registry and chain transport for bookledger
//!
//! The registry owns the set of known peer identifiers. The transport is the
//! seam through which the synchronizer fetches remote chains and pushes
//! transactions; [`HttpTransport`] speaks the node's JSON-over-HTTP routes and
//! [`LocalTransport`] routes calls straight into in-process ledgers.

use crate::blockchain::{Block, Ledger};
use crate::error::ChainError;
use crate::transaction::{Transaction, TransactionRequest};
use async_trait::async_trait;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Method, Request, Uri};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Peers with this many consecutive failures are reported as unreliable.
pub const DEFAULT_MAX_PEER_FAILURES: u32 = 3;

/// Largest response body [`HttpTransport`] will buffer.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// Peer addresses
// ============================================================================

/// Reduces a peer address to the identifier stored in the registry.
///
/// A URL with a network location (`http://10.0.0.5:5000/`) yields the
/// `host:port` part. Anything else yields its path (`10.0.0.5:5000`). An
/// address with neither is rejected.
pub fn parse_peer_address(address: &str) -> Result<String, ChainError> {
    let address = address.trim();
    if address.chars().any(char::is_whitespace) {
        return Err(ChainError::ValidationError(format!(
            "Invalid peer address '{}': contains whitespace",
            address
        )));
    }

    let rest = match address.find("://") {
        Some(pos) => {
            let scheme = &address[..pos];
            let valid_scheme = scheme
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !valid_scheme {
                return Err(ChainError::ValidationError(format!(
                    "Invalid peer address '{}': bad scheme",
                    address
                )));
            }
            Some(&address[pos + 3..])
        }
        None => address.strip_prefix("//"),
    };

    // Strip query and fragment before looking for a location or path.
    let strip = |s: &str| -> String {
        let end = s.find(&['?', '#'][..]).unwrap_or(s.len());
        s[..end].to_string()
    };

    if let Some(rest) = rest {
        let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
        let netloc = &rest[..end];
        if !netloc.is_empty() {
            return Ok(netloc.to_string());
        }
        let path = strip(&rest[end..]);
        if !path.is_empty() {
            return Ok(path);
        }
    } else {
        let path = strip(address);
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(ChainError::ValidationError(format!(
        "Invalid peer address '{}'",
        address
    )))
}

// ============================================================================
// Peer registry
// ============================================================================

/// Health bookkeeping for one registered peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub address: String,
    pub consecutive_failures: u32,
    pub successful_fetches: u64,
    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl PeerInfo {
    fn new(address: String) -> Self {
        Self {
            address,
            consecutive_failures: 0,
            successful_fetches: 0,
            last_seen: None,
        }
    }

    pub fn is_unreliable(&self, max_failures: u32) -> bool {
        self.consecutive_failures >= max_failures
    }
}

/// Thread-safe set of known peers.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    inner: Arc<RwLock<HashMap<String, PeerInfo>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one peer. Returns whether it was new.
    pub fn register(&self, address: &str) -> Result<bool, ChainError> {
        let id = parse_peer_address(address)?;
        let mut peers = self.inner.write();
        if peers.contains_key(&id) {
            return Ok(false);
        }
        peers.insert(id.clone(), PeerInfo::new(id));
        Ok(true)
    }

    /// Adds every address, or none of them if any fails to parse.
    pub fn register_all<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<String>, ChainError> {
        let ids = addresses
            .iter()
            .map(|a| parse_peer_address(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut peers = self.inner.write();
        for id in ids {
            peers.entry(id.clone()).or_insert_with(|| PeerInfo::new(id));
        }
        drop(peers);
        Ok(self.peers())
    }

    /// Snapshot of the peer set, sorted for stable output.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.inner.read().keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn peer_info(&self) -> Vec<PeerInfo> {
        let mut info: Vec<PeerInfo> = self.inner.read().values().cloned().collect();
        info.sort_by(|a, b| a.address.cmp(&b.address));
        info
    }

    pub fn get(&self, address: &str) -> Option<PeerInfo> {
        self.inner.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn record_success(&self, address: &str) {
        if let Some(peer) = self.inner.write().get_mut(address) {
            peer.consecutive_failures = 0;
            peer.successful_fetches += 1;
            peer.last_seen = Some(Instant::now());
        }
    }

    pub fn record_failure(&self, address: &str) {
        if let Some(peer) = self.inner.write().get_mut(address) {
            peer.consecutive_failures = peer.consecutive_failures.saturating_add(1);
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Body of `GET /get_chain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: u64,
}

impl ChainResponse {
    /// Checks that the advertised length matches the chain actually sent.
    pub fn into_chain(self) -> Result<Vec<Block>, ChainError> {
        if self.length != self.chain.len() as u64 {
            return Err(ChainError::ValidationError(format!(
                "Chain response advertises length {} but carries {} blocks",
                self.length,
                self.chain.len()
            )));
        }
        Ok(self.chain)
    }
}

/// Remote operations the synchronizer needs from another node.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Fetches the peer's full chain.
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, ChainError>;

    /// Queues `tx` in the peer's pending pool.
    async fn submit_transaction(&self, peer: &str, tx: &Transaction) -> Result<(), ChainError>;

    /// Asks the peer to seal its pending pool into a block.
    async fn request_block(&self, peer: &str) -> Result<(), ChainError>;
}

/// JSON-over-HTTP transport speaking the node's public routes.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
            max_response_bytes: MAX_RESPONSE_BYTES,
        }
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    fn uri(peer: &str, path: &str) -> Result<Uri, ChainError> {
        let base = peer.trim_end_matches('/');
        let url = if base.contains("://") {
            format!("{}{}", base, path)
        } else {
            format!("http://{}{}", base, path)
        };
        url.parse::<Uri>()
            .map_err(|e| ChainError::ValidationError(format!("Invalid peer URL {}: {}", url, e)))
    }

    fn oversized(&self, peer: &str) -> ChainError {
        ChainError::TransportError(format!(
            "{} response exceeds {} bytes",
            peer, self.max_response_bytes
        ))
    }

    /// Buffers `body`, giving up as soon as it grows past the configured cap.
    async fn read_body(&self, peer: &str, mut body: Body) -> Result<Vec<u8>, ChainError> {
        let mut buf = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| ChainError::TransportError(format!("{}: {}", peer, e)))?;
            if buf.len() + chunk.len() > self.max_response_bytes {
                return Err(self.oversized(peer));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    async fn send(&self, peer: &str, request: Request<Body>) -> Result<Vec<u8>, ChainError> {
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ChainError::TransportError(format!("{}: {}", peer, e)))?;
            let status = response.status();
            let declared = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            if declared.is_some_and(|length| length > self.max_response_bytes as u64) {
                return Err(self.oversized(peer));
            }
            let body = self.read_body(peer, response.into_body()).await?;
            if !status.is_success() {
                return Err(ChainError::TransportError(format!(
                    "{} answered with status {}",
                    peer, status
                )));
            }
            Ok(body)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                ChainError::TransportError(format!(
                    "{} timed out after {} ms",
                    peer,
                    self.timeout.as_millis()
                ))
            })?
    }

    /// `GET http://{peer}{path}`, decoding a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, peer: &str, path: &str) -> Result<T, ChainError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(Self::uri(peer, path)?)
            .body(Body::empty())
            .map_err(|e| ChainError::TransportError(e.to_string()))?;
        let body = self.send(peer, request).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ChainError::ValidationError(format!("Malformed response from {}: {}", peer, e))
        })
    }

    /// `POST http://{peer}{path}` with a JSON body, decoding a JSON reply.
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        peer: &str,
        path: &str,
        body: &B,
    ) -> Result<T, ChainError> {
        let payload = serde_json::to_vec(body)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(Self::uri(peer, path)?)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .map_err(|e| ChainError::TransportError(e.to_string()))?;
        let body = self.send(peer, request).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ChainError::ValidationError(format!("Malformed response from {}: {}", peer, e))
        })
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, ChainError> {
        let response: ChainResponse = self.get_json(peer, "/get_chain").await?;
        response.into_chain()
    }

    async fn submit_transaction(&self, peer: &str, tx: &Transaction) -> Result<(), ChainError> {
        let _: serde_json::Value = self
            .post_json(peer, "/add_transaction", &TransactionRequest::from(tx))
            .await?;
        Ok(())
    }

    async fn request_block(&self, peer: &str) -> Result<(), ChainError> {
        let _: serde_json::Value = self.get_json(peer, "/add_block").await?;
        Ok(())
    }
}

/// In-process transport: each peer id maps directly to a shared ledger.
///
/// Used for tests and single-process simulations. Unknown peers behave like
/// unreachable hosts; a per-peer delay simulates slow links.
#[derive(Clone, Default)]
pub struct LocalTransport {
    ledgers: Arc<RwLock<HashMap<String, Arc<tokio::sync::RwLock<Ledger>>>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, peer: &str, ledger: Arc<tokio::sync::RwLock<Ledger>>) {
        self.ledgers.write().insert(peer.to_string(), ledger);
    }

    pub fn disconnect(&self, peer: &str) {
        self.ledgers.write().remove(peer);
    }

    pub fn set_delay(&self, peer: &str, delay: Duration) {
        self.delays.write().insert(peer.to_string(), delay);
    }

    async fn ledger_for(&self, peer: &str) -> Result<Arc<tokio::sync::RwLock<Ledger>>, ChainError> {
        let delay = self.delays.read().get(peer).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ledgers
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| ChainError::TransportError(format!("{}: peer unreachable", peer)))
    }
}

#[async_trait]
impl ChainTransport for LocalTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, ChainError> {
        let ledger = self.ledger_for(peer).await?;
        let chain = ledger.read().await.blocks().to_vec();
        Ok(chain)
    }

    async fn submit_transaction(&self, peer: &str, tx: &Transaction) -> Result<(), ChainError> {
        let ledger = self.ledger_for(peer).await?;
        ledger.write().await.add_transaction(tx.clone());
        Ok(())
    }

    async fn request_block(&self, peer: &str) -> Result<(), ChainError> {
        let ledger = self.ledger_for(peer).await?;
        ledger.write().await.new_block(None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_peer_address("10.0.0.5:5000").unwrap(), "10.0.0.5:5000");
    }

    #[test]
    fn test_parse_url_keeps_network_location() {
        assert_eq!(
            parse_peer_address("http://192.168.0.5:5000/get_chain?x=1").unwrap(),
            "192.168.0.5:5000"
        );
        assert_eq!(parse_peer_address("//node-b:5001").unwrap(), "node-b:5001");
    }

    #[test]
    fn test_parse_rejects_empty_and_locationless() {
        assert!(parse_peer_address("").is_err());
        assert!(parse_peer_address("   ").is_err());
        assert!(parse_peer_address("http://").is_err());
        assert!(parse_peer_address("?query").is_err());
        assert!(parse_peer_address("1http://host").is_err());
        assert!(parse_peer_address("host 5000").is_err());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = PeerRegistry::new();
        assert!(registry.register("10.0.0.5:5000").unwrap());
        assert!(!registry.register("10.0.0.5:5000").unwrap());
        assert_eq!(registry.peers(), vec!["10.0.0.5:5000".to_string()]);
    }

    #[test]
    fn test_register_all_is_all_or_nothing() {
        let registry = PeerRegistry::new();
        let err = registry.register_all(&["10.0.0.5:5000", ""]).unwrap_err();
        assert!(matches!(err, ChainError::ValidationError(_)));
        assert!(registry.is_empty());

        let peers = registry
            .register_all(&["http://10.0.0.6:5000", "10.0.0.5:5000", "10.0.0.5:5000"])
            .unwrap();
        assert_eq!(peers, vec!["10.0.0.5:5000", "10.0.0.6:5000"]);
    }

    #[test]
    fn test_failure_tracking() {
        let registry = PeerRegistry::new();
        registry.register("a:1").unwrap();
        for _ in 0..DEFAULT_MAX_PEER_FAILURES {
            registry.record_failure("a:1");
        }
        assert!(registry.get("a:1").unwrap().is_unreliable(DEFAULT_MAX_PEER_FAILURES));

        registry.record_success("a:1");
        let info = registry.get("a:1").unwrap();
        assert!(!info.is_unreliable(DEFAULT_MAX_PEER_FAILURES));
        assert_eq!(info.successful_fetches, 1);
        assert!(info.last_seen.is_some());
    }

    #[test]
    fn test_chain_response_length_mismatch() {
        let response = ChainResponse {
            chain: vec![Block::genesis()],
            length: 2,
        };
        assert!(matches!(
            response.into_chain(),
            Err(ChainError::ValidationError(_))
        ));
    }

    #[test]
    fn test_http_uri_building() {
        let uri = HttpTransport::uri("10.0.0.5:5000", "/get_chain").unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:5000/get_chain");
        let uri = HttpTransport::uri("https://peer.example/", "/add_block").unwrap();
        assert_eq!(uri.to_string(), "https://peer.example/add_block");
    }

    /// Accepts one connection on an ephemeral port and answers it with
    /// `head` followed by `body`.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        addr.to_string()
    }

    fn json_head(length: usize) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            length
        )
    }

    #[tokio::test]
    async fn test_http_fetch_within_body_limit() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let body = serde_json::to_vec(&ChainResponse {
                chain: vec![Block::genesis()],
                length: 1,
            })
            .unwrap();
            let peer = serve_once(json_head(body.len()), body).await;

            let transport = HttpTransport::new(Duration::from_secs(2)).with_max_response_bytes(4096);
            let chain = transport.fetch_chain(&peer).await.unwrap();
            assert_eq!(chain, vec![Block::genesis()]);
        })
        .await
        .expect("test_http_fetch_within_body_limit timed out");
    }

    #[tokio::test]
    async fn test_http_declared_length_over_limit_rejected() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let body = vec![b' '; 1024];
            let peer = serve_once(json_head(body.len()), body).await;

            let transport = HttpTransport::new(Duration::from_secs(2)).with_max_response_bytes(64);
            let err = transport.fetch_chain(&peer).await.unwrap_err();
            assert!(matches!(err, ChainError::TransportError(_)));
            assert!(err.to_string().contains("exceeds 64 bytes"));
        })
        .await
        .expect("test_http_declared_length_over_limit_rejected timed out");
    }

    #[tokio::test]
    async fn test_http_chunked_body_over_limit_rejected() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let payload = " ".repeat(1024);
            let body = format!("{:x}\r\n{}\r\n0\r\n\r\n", payload.len(), payload).into_bytes();
            let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_string();
            let peer = serve_once(head, body).await;

            let transport = HttpTransport::new(Duration::from_secs(2)).with_max_response_bytes(64);
            let err = transport.fetch_chain(&peer).await.unwrap_err();
            assert!(err.to_string().contains("exceeds 64 bytes"));
        })
        .await
        .expect("test_http_chunked_body_over_limit_rejected timed out");
    }

    #[tokio::test]
    async fn test_local_transport_roundtrip() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let transport = LocalTransport::new();
            let remote = Arc::new(tokio::sync::RwLock::new(Ledger::new()));
            transport.connect("peer:1", remote.clone());

            transport
                .submit_transaction("peer:1", &Transaction::new("a", "b", "c"))
                .await
                .unwrap();
            transport.request_block("peer:1").await.unwrap();

            let chain = transport.fetch_chain("peer:1").await.unwrap();
            assert_eq!(chain.len(), 2);
            assert_eq!(chain[1].transactions.len(), 1);

            let err = transport.fetch_chain("missing:1").await.unwrap_err();
            assert!(matches!(err, ChainError::TransportError(_)));
        })
        .await
        .expect("test_local_transport_roundtrip timed out");
    }
}
