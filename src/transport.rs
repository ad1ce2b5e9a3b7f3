//! Peer Transport (§4.2): a lazily-connecting, per-peer TCP client with a
//! bounded per-call timeout. Failed calls evict the cached connection so the
//! next attempt reconnects from scratch.

use crate::rpc::{read_frame, write_frame, RaftMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rpc to {address} failed: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rpc to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// One cached connection, guarded so concurrent calls to the same peer don't
/// interleave reads/writes on the same socket.
type CachedConn = Arc<Mutex<TcpStream>>;

pub struct PeerTransport {
    timeout: Duration,
    channels: Mutex<HashMap<String, CachedConn>>,
}

impl PeerTransport {
    pub fn new(timeout: Duration) -> Self {
        PeerTransport {
            timeout,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Send `message` to `address`, establishing a connection on first use
    /// and reusing it afterwards. On any failure (connect, I/O, or timeout)
    /// the cached connection for `address` is evicted.
    pub async fn call(&self, address: &str, message: &RaftMessage) -> Result<RaftMessage, TransportError> {
        let conn = self.get_or_connect(address).await?;

        let outcome = tokio::time::timeout(self.timeout, Self::exchange(&conn, message)).await;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => {
                self.evict(address).await;
                Err(TransportError::Io { address: address.to_string(), source })
            }
            Err(_) => {
                self.evict(address).await;
                Err(TransportError::Timeout { address: address.to_string(), timeout: self.timeout })
            }
        }
    }

    async fn get_or_connect(&self, address: &str) -> Result<CachedConn, TransportError> {
        let mut channels = self.channels.lock().await;
        if let Some(conn) = channels.get(address) {
            return Ok(Arc::clone(conn));
        }

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Timeout { address: address.to_string(), timeout: self.timeout })?
            .map_err(|source| TransportError::Connect { address: address.to_string(), source })?;

        let conn = Arc::new(Mutex::new(stream));
        channels.insert(address.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    async fn exchange(conn: &CachedConn, message: &RaftMessage) -> std::io::Result<RaftMessage> {
        let mut stream = conn.lock().await;
        write_frame(&mut stream, message).await?;
        read_frame(&mut stream).await
    }

    /// Tear down the cached channel for `address`, if any, so the next call
    /// reconnects.
    pub async fn evict(&self, address: &str) {
        self.channels.lock().await.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn call_reconnects_after_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Accept exactly one connection, then drop it without responding to
        // simulate a peer that dies mid-RPC.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            let _ = stream.read_exact(&mut len_buf).await;
            // Drop instead of replying.
        });

        let transport = PeerTransport::new(Duration::from_millis(200));
        let req = RaftMessage::RequestVote {
            term: 1.into(),
            candidate_id: "a".into(),
            last_log_index: 0,
            last_log_term: 0.into(),
        };

        let result = transport.call(&addr, &req).await;
        assert!(result.is_err());
        assert!(transport.channels.lock().await.get(&addr).is_none());
    }

    #[tokio::test]
    async fn call_round_trips_over_cached_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    loop {
                        let msg = match crate::rpc::read_frame(&mut stream).await {
                            Ok(m) => m,
                            Err(_) => return,
                        };
                        let _ = msg;
                        let resp = RaftMessage::RequestVoteResponse {
                            term: 1.into(),
                            vote_granted: true,
                            voter_id: "b".into(),
                        };
                        if crate::rpc::write_frame(&mut stream, &resp).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        let transport = PeerTransport::new(Duration::from_millis(500));
        let req = RaftMessage::RequestVote {
            term: 1.into(),
            candidate_id: "a".into(),
            last_log_index: 0,
            last_log_term: 0.into(),
        };

        for _ in 0..3 {
            let resp = transport.call(&addr, &req).await.unwrap();
            match resp {
                RaftMessage::RequestVoteResponse { vote_granted, .. } => assert!(vote_granted),
                _ => panic!("unexpected response"),
            }
        }
    }
}
