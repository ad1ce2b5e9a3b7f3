//! Peer-facing RPC dispatch listener (§4.2, §6): accepts inbound
//! `RaftMessage` frames on `self_address` and routes each to the matching
//! `RaftNode` handler, mirroring the teacher's `start_raft_listener` /
//! `handle_raft_message` split in `bin/server.rs`.

use crate::node::RaftNode;
use crate::rpc::{read_frame, write_frame, RaftMessage};
use log::{error, info};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Bind `address` and serve inbound peer RPCs against `node` until the
/// listener itself fails. Each accepted connection is handled on its own
/// task so one slow or malicious peer cannot stall RPC dispatch for others.
pub async fn run_rpc_server(address: &str, node: Arc<RaftNode>) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Node {} RPC listener bound on {}", node.node_id, address);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, node).await {
                error!("connection from {} ended with error: {}", peer_addr, e);
            }
        });
    }
}

/// Serve one peer connection: read frames, dispatch, write the response,
/// until the peer closes the socket or sends a malformed frame.
async fn handle_connection(mut stream: TcpStream, node: Arc<RaftNode>) -> std::io::Result<()> {
    loop {
        let message = match read_frame(&mut stream).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = dispatch(&node, message).await;
        write_frame(&mut stream, &response).await?;
    }
}

/// Route one decoded `RaftMessage` to the matching `RaftNode` handler and
/// build the wire-level response.
async fn dispatch(node: &Arc<RaftNode>, message: RaftMessage) -> RaftMessage {
    match message {
        RaftMessage::RequestVote { term, candidate_id, last_log_index, last_log_term } => {
            let (term, vote_granted) =
                node.handle_request_vote(term, candidate_id, last_log_index, last_log_term).await;
            RaftMessage::RequestVoteResponse { term, vote_granted, voter_id: node.node_id.clone() }
        }
        RaftMessage::AppendEntries { term, leader_id, prev_log_index, prev_log_term, entries, leader_commit } => {
            let (term, success, last_log_index) = node
                .handle_append_entries(term, leader_id, prev_log_index, prev_log_term, entries, leader_commit)
                .await;
            RaftMessage::AppendEntriesResponse { term, follower_id: node.node_id.clone(), success, last_log_index }
        }
        RaftMessage::SubmitOperation { operation, source_id } => {
            let outcome = node.submit_operation(operation, source_id).await;
            RaftMessage::SubmitOperationResponse {
                success: outcome.success,
                result: outcome.result,
                leader_id: outcome.leader_id,
            }
        }
        other => {
            // Responses should never arrive as a fresh inbound request; the
            // transport only reads responses as the reply to its own call.
            error!("Node {} received unexpected inbound message: {:?}", node.node_id, other);
            RaftMessage::SubmitOperationResponse {
                success: false,
                result: "unexpected message".to_string(),
                leader_id: String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::state_machine::EchoStateMachine;
    use crate::transport::PeerTransport;
    use std::time::Duration;

    fn test_config(node_id: &str) -> NodeConfig {
        NodeConfig {
            node_id: node_id.to_string(),
            self_address: None,
            peers: Vec::new(),
            rpc_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn serves_request_vote_over_the_wire() {
        let node = RaftNode::new(test_config("n1"), Arc::new(EchoStateMachine));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener); // free the port; run_rpc_server rebinds it

        let server_node = Arc::clone(&node);
        let server_addr = addr.clone();
        tokio::spawn(async move {
            let _ = run_rpc_server(&server_addr, server_node).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let transport = PeerTransport::new(Duration::from_millis(500));
        let request = RaftMessage::RequestVote {
            term: 1.into(),
            candidate_id: "candidate".into(),
            last_log_index: 0,
            last_log_term: 0.into(),
        };

        let response = transport.call(&addr, &request).await.unwrap();
        match response {
            RaftMessage::RequestVoteResponse { vote_granted, voter_id, .. } => {
                assert!(vote_granted);
                assert_eq!(voter_id, "n1");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
