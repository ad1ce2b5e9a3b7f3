//! `raft_core` is the replicated coordination core for a clustered
//! seat-reservation backend (SPEC_FULL.md §1-§2): a Raft-style
//! leader-election and log-replication engine invoked synchronously in
//! front of every state-mutating request so the cluster agrees on a total
//! order of intents before any instance applies them locally.
//!
//! The crate exposes a small surface to embedders:
//!
//! - [`config::NodeConfig`] loads cluster membership and timing knobs from
//!   the environment (§6).
//! - [`node::RaftNode`] is the protocol engine: role/term/log/commit state,
//!   the election and heartbeat timers, and the peer RPC handlers (§4.1).
//! - [`facade::SubmissionFacade`] is the one entry point a service handler
//!   calls to submit an operation and wait for commit (§4.4).
//! - [`state_machine::StateMachine`] is the pluggable apply hook an embedder
//!   implements to replay committed operations into its own storage (§9
//!   Open Question #4).
//! - [`server::run_rpc_server`] accepts peer connections and dispatches
//!   `RaftMessage`s to a `RaftNode` (§4.2/§6).
//!
//! Everything else (HTTP/gRPC handlers, the SQL schema, JWT auth, the
//! expiration sweeper) lives outside this crate's boundary per §1.

pub mod config;
pub mod error;
pub mod facade;
pub mod log;
pub mod node;
pub mod rpc;
pub mod server;
pub mod state_machine;
pub mod transport;
pub mod types;

pub use config::NodeConfig;
pub use error::CoreError;
pub use facade::SubmissionFacade;
pub use node::RaftNode;
pub use state_machine::{EchoStateMachine, StateMachine};
pub use types::{LogEntry, NodeId, Role, Term};