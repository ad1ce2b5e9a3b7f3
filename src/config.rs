//! Environment-supplied configuration (§6).

use crate::types::NodeId;
use std::collections::HashMap;
use std::time::Duration;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);
pub const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(1500);
pub const ELECTION_TIMEOUT_MAX: Duration = Duration::from_millis(3000);
pub const SUBMIT_DEADLINE: Duration = Duration::from_millis(5000);
const DEFAULT_RPC_TIMEOUT_SECS: f64 = 0.75;

/// A single cluster peer: its id and the address used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: NodeId,
    pub address: String,
}

/// Static cluster membership and this node's own identity (§3
/// `PeerDirectory`, §6 configuration).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub self_address: Option<String>,
    pub peers: Vec<Peer>,
    pub rpc_timeout: Duration,
}

impl NodeConfig {
    /// Load configuration from the environment variables named in §6.
    pub fn from_env() -> Self {
        let node_id = std::env::var("RAFT_NODE_ID")
            .or_else(|_| std::env::var("INSTANCE_ID"))
            .unwrap_or_else(|_| "node-1".to_string());
        let self_address = std::env::var("RAFT_SELF_ADDRESS").ok();
        let raw_peers = std::env::var("RAFT_PEERS").unwrap_or_default();
        let rpc_timeout_secs = std::env::var("RAFT_RPC_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_RPC_TIMEOUT_SECS);

        let peers = parse_peer_config(&raw_peers, &node_id, self_address.as_deref());

        NodeConfig {
            node_id,
            self_address,
            peers,
            rpc_timeout: Duration::from_secs_f64(rpc_timeout_secs),
        }
    }

    /// Build the `id -> address` directory used to forward `SubmitOperation`
    /// and to look up a peer's transport endpoint, including this node's own
    /// entry when it has a self-address.
    pub fn id_to_address(&self) -> HashMap<NodeId, String> {
        let mut map = HashMap::new();
        if let Some(addr) = &self.self_address {
            map.insert(self.node_id.clone(), addr.clone());
        }
        for peer in &self.peers {
            map.insert(peer.id.clone(), peer.address.clone());
        }
        map
    }
}

/// Parse `RAFT_PEERS` entries of the form `id@address` or bare `address`.
/// Entries that name this node (by id or by self-address) are skipped.
pub fn parse_peer_config(raw_peers: &str, node_id: &str, self_address: Option<&str>) -> Vec<Peer> {
    let mut peers = Vec::new();
    for raw in raw_peers.split(',') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let (peer_id, address) = match entry.split_once('@') {
            Some((id, addr)) => (id.to_string(), addr.to_string()),
            None => (entry.to_string(), entry.to_string()),
        };

        if peer_id == node_id || self_address == Some(address.as_str()) {
            continue;
        }

        peers.push(Peer {
            id: peer_id,
            address,
        });
    }
    peers
}
