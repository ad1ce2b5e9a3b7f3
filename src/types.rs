//! Core data types shared across the Raft engine: node identity, terms,
//! roles and log entries (§3).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, cluster-unique identifier for a node.
pub type NodeId = String;

/// A monotonically non-decreasing election epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Term(pub u64);

impl Term {
    pub const ZERO: Term = Term(0);

    pub fn next(self) -> Term {
        Term(self.0 + 1)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Term {
    fn from(value: u64) -> Self {
        Term(value)
    }
}

impl From<Term> for u64 {
    fn from(value: Term) -> Self {
        value.0
    }
}

/// The three roles a node cycles through (§2 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        write!(f, "{}", s)
    }
}

/// A single entry in the replicated log (§3). `index` is 1-based; entries
/// are totally ordered by index and the log has no gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: Term,
    pub operation: String,
}
