//! Peer RPC wire protocol (§6). Messages are framed as a big-endian `u32`
//! length prefix followed by a JSON-encoded `RaftMessage`, the same framing
//! the teacher codebase uses for its TCP traffic.

use crate::types::{LogEntry, Term};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RaftMessage {
    RequestVote {
        term: Term,
        candidate_id: String,
        last_log_index: u64,
        last_log_term: Term,
    },
    RequestVoteResponse {
        term: Term,
        vote_granted: bool,
        voter_id: String,
    },
    AppendEntries {
        term: Term,
        leader_id: String,
        prev_log_index: u64,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    },
    AppendEntriesResponse {
        term: Term,
        follower_id: String,
        success: bool,
        /// Length of the follower's log after processing this RPC; used by
        /// the leader as a conflict hint to adjust `next_index`.
        last_log_index: u64,
    },
    SubmitOperation {
        operation: String,
        source_id: String,
    },
    SubmitOperationResponse {
        success: bool,
        result: String,
        leader_id: String,
    },
}

impl RaftMessage {
    /// The RPC name used in the `sends RPC <name>` / `runs RPC <name>`
    /// observability lines (§6).
    pub fn name(&self) -> &'static str {
        match self {
            RaftMessage::RequestVote { .. } | RaftMessage::RequestVoteResponse { .. } => "RequestVote",
            RaftMessage::AppendEntries { .. } | RaftMessage::AppendEntriesResponse { .. } => "AppendEntries",
            RaftMessage::SubmitOperation { .. } | RaftMessage::SubmitOperationResponse { .. } => "SubmitOperation",
        }
    }
}

/// Read one length-prefixed JSON frame from `stream`.
pub async fn read_frame(stream: &mut TcpStream) -> std::io::Result<RaftMessage> {
    let len = stream.read_u32().await?;
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Write one length-prefixed JSON frame to `stream`.
pub async fn write_frame(stream: &mut TcpStream, message: &RaftMessage) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(message).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_u32(bytes.len() as u32).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}
