//! Boots one cluster member from environment configuration (§6) and wires
//! the reference `EchoStateMachine` as its apply hook. Mirrors the
//! teacher's `bin/server.rs` shape: `env_logger::init()`, parse config,
//! spawn the peer RPC listener, spawn the node's timer loop, then block.

use anyhow::{Context, Result};
use log::info;
use raft_core::{EchoStateMachine, NodeConfig, RaftNode};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = NodeConfig::from_env();
    info!(
        "Node {} starting: self_address={:?}, peers={:?}, rpc_timeout={:?}",
        config.node_id, config.self_address, config.peers, config.rpc_timeout
    );

    let self_address = config
        .self_address
        .clone()
        .context("RAFT_SELF_ADDRESS must be set so peers can reach this node")?;

    let node = RaftNode::new(config, Arc::new(EchoStateMachine));
    node.start();

    info!("Node {} running as follower, waiting for election timeout or AppendEntries", node.node_id);
    raft_core::server::run_rpc_server(&self_address, node).await.context("RPC listener failed")?;

    Ok(())
}
