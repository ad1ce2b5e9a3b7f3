//! Typed error kinds for the coordination core (§7).
//!
//! `TermStale` and transport failures are recovered internally (the node
//! steps down or evicts a cached peer channel) and never escape as a
//! `CoreError` — they are logged and swallowed at the call site. The
//! variants below are the ones that actually cross the `SubmitOperation`
//! boundary into `SubmissionFacade` and out to the embedding service.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// `SubmitOperation` reached a node with no known leader.
    #[error("No known leader")]
    NoLeader,

    /// The submit waiter expired before the entry committed.
    #[error("Commit timeout")]
    CommitTimeout { leader_id: String },

    /// A non-leader failed to forward the operation to the leader.
    #[error("forward to leader failed: {0}")]
    ForwardFailure(String),
}

impl CoreError {
    /// The best-known leader id to surface alongside this error, if any.
    pub fn leader_id(&self) -> Option<&str> {
        match self {
            CoreError::CommitTimeout { leader_id } => Some(leader_id),
            _ => None,
        }
    }
}
