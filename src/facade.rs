//! Submission Facade (§4.4): the single entry point an embedding service
//! calls to submit an operation, translating the node's always-succeeds
//! `SubmitOutcome` into a `Result` an embedder can match on.

use crate::error::CoreError;
use crate::node::RaftNode;
use std::sync::Arc;

/// Thin wrapper around `Arc<RaftNode>` exposing the one operation an
/// embedding service needs (§4.4). Kept separate from `RaftNode` itself so
/// the node's internal RPC-handling surface isn't part of the embedder-facing
/// API.
#[derive(Clone)]
pub struct SubmissionFacade {
    node: Arc<RaftNode>,
}

impl SubmissionFacade {
    pub fn new(node: Arc<RaftNode>) -> Self {
        SubmissionFacade { node }
    }

    /// Submit `operation` for replication and commit. Resolves once the
    /// entry is durably committed and applied locally, or fails with
    /// `CoreError` if no leader is known, the local node can't reach the
    /// leader, or the commit doesn't happen within the submit deadline
    /// (§4.1, §7).
    pub async fn submit(&self, operation: String) -> Result<String, CoreError> {
        let outcome = self
            .node
            .submit_operation(operation, self.node.node_id.clone())
            .await;

        if outcome.success {
            return Ok(outcome.result);
        }

        if outcome.result == "No known leader" {
            return Err(CoreError::NoLeader);
        }
        if outcome.result == "Commit timeout" {
            return Err(CoreError::CommitTimeout { leader_id: outcome.leader_id });
        }
        Err(CoreError::ForwardFailure(outcome.result))
    }

    pub async fn is_leader(&self) -> bool {
        self.node.is_leader().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeConfig, Peer};
    use crate::state_machine::EchoStateMachine;
    use std::time::Duration;

    fn single_node_config() -> NodeConfig {
        NodeConfig {
            node_id: "solo".into(),
            self_address: None,
            peers: Vec::<Peer>::new(),
            rpc_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn submit_without_a_leader_fails_fast() {
        let node = RaftNode::new(single_node_config(), Arc::new(EchoStateMachine));
        let facade = SubmissionFacade::new(node);
        let err = facade.submit("Seat.Hold".into()).await.unwrap_err();
        assert_eq!(err, CoreError::NoLeader);
    }

    #[tokio::test]
    async fn submit_succeeds_once_node_is_the_leader() {
        let node = RaftNode::new(single_node_config(), Arc::new(EchoStateMachine));
        node.start_election().await; // sole voter, wins immediately
        assert!(node.is_leader().await);

        let facade = SubmissionFacade::new(node);
        let result = facade.submit("Seat.Hold".into()).await.unwrap();
        assert_eq!(result, "Executed Seat.Hold at index 1 (term 1)");
    }
}
