//! Multi-node replication scenarios over the in-process transport.

use bookledger::blockchain::Ledger;
use bookledger::network::{LocalTransport, PeerRegistry};
use bookledger::sync::{NodeSynchronizer, SyncState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

struct TestNode {
    id: String,
    ledger: Arc<RwLock<Ledger>>,
    sync: NodeSynchronizer,
}

/// Builds `count` nodes that all know each other through one transport.
fn cluster(count: usize) -> Vec<TestNode> {
    cluster_on(&LocalTransport::new(), count)
}

fn cluster_on(transport: &LocalTransport, count: usize) -> Vec<TestNode> {
    let ids: Vec<String> = (0..count).map(|i| format!("127.0.0.1:{}", 5000 + i)).collect();

    ids.iter()
        .map(|id| {
            let ledger = Arc::new(RwLock::new(Ledger::new()));
            transport.connect(id, ledger.clone());

            let peers = PeerRegistry::new();
            let others: Vec<&String> = ids.iter().filter(|other| *other != id).collect();
            peers.register_all(&others[..]).unwrap();

            let sync = NodeSynchronizer::new(ledger.clone(), peers, Arc::new(transport.clone()))
                .with_peer_timeout(Duration::from_millis(200))
                .with_local_id(id.clone());
            TestNode {
                id: id.clone(),
                ledger,
                sync,
            }
        })
        .collect()
}

async fn grow(node: &TestNode, blocks: usize) {
    let mut ledger = node.ledger.write().await;
    for i in 0..blocks {
        ledger.new_transaction(node.id.clone(), "reader", format!("book-{}", i));
        ledger.new_block(None).unwrap();
    }
}

#[tokio::test]
async fn test_cluster_converges_on_longest_chain() {
    tokio::time::timeout(Duration::from_secs(10), async {
        let nodes = cluster(3);
        grow(&nodes[0], 2).await;
        grow(&nodes[1], 4).await;
        grow(&nodes[2], 1).await;

        for node in &nodes {
            node.sync.resolve().await;
        }

        let expected = nodes[1].ledger.read().await.blocks().to_vec();
        assert_eq!(expected.len(), 5);
        for node in &nodes {
            let ledger = node.ledger.read().await;
            assert_eq!(ledger.blocks(), expected.as_slice(), "{} diverged", node.id);
            assert!(Ledger::validate(ledger.blocks()));
        }
    })
    .await
    .expect("test_cluster_converges_on_longest_chain timed out");
}

#[tokio::test]
async fn test_propagated_transactions_reach_every_peer() {
    tokio::time::timeout(Duration::from_secs(10), async {
        let nodes = cluster(3);
        {
            let mut ledger = nodes[0].ledger.write().await;
            ledger.new_transaction("A", "B", "book-1");
            ledger.new_transaction("B", "C", "book-2");
        }

        let report = nodes[0].sync.propagate_pending().await;
        assert_eq!(report.accepted.len(), 2);
        assert!(report.failed.is_empty());

        for node in &nodes[1..] {
            let ledger = node.ledger.read().await;
            assert_eq!(ledger.len(), 2);
            let books: Vec<&str> = ledger
                .last_block()
                .transactions
                .iter()
                .map(|tx| tx.book.as_str())
                .collect();
            assert_eq!(books, vec!["book-1", "book-2"]);
        }
    })
    .await
    .expect("test_propagated_transactions_reach_every_peer timed out");
}

#[tokio::test]
async fn test_concurrent_resolutions_leave_valid_chains() {
    tokio::time::timeout(Duration::from_secs(10), async {
        let nodes = Arc::new(cluster(4));
        for (i, node) in nodes.iter().enumerate() {
            grow(node, i + 1).await;
        }

        let mut handles = Vec::new();
        for i in 0..nodes.len() {
            let nodes = nodes.clone();
            handles.push(tokio::spawn(async move {
                nodes[i].sync.resolve().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for node in nodes.iter() {
            let ledger = node.ledger.read().await;
            assert!(Ledger::validate(ledger.blocks()));
            assert_eq!(ledger.len(), 5);
            assert_eq!(node.sync.get_sync_state().await, SyncState::Synced);
        }
    })
    .await
    .expect("test_concurrent_resolutions_leave_valid_chains timed out");
}

#[tokio::test]
async fn test_disconnected_peer_is_skipped() {
    tokio::time::timeout(Duration::from_secs(10), async {
        let transport = LocalTransport::new();
        let nodes = cluster_on(&transport, 3);
        grow(&nodes[1], 2).await;
        grow(&nodes[2], 4).await;
        transport.disconnect(&nodes[2].id);

        let resolution = nodes[0].sync.resolve().await;
        assert!(resolution.replaced);
        assert_eq!(resolution.source.as_deref(), Some(nodes[1].id.as_str()));
        assert_eq!(nodes[0].ledger.read().await.len(), 3);

        let dropped = nodes[0].sync.peers().get(&nodes[2].id).unwrap();
        assert_eq!(dropped.consecutive_failures, 1);
        let reachable = nodes[0].sync.peers().get(&nodes[1].id).unwrap();
        assert_eq!(reachable.consecutive_failures, 0);
    })
    .await
    .expect("test_disconnected_peer_is_skipped timed out");
}
