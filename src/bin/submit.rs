//! A tiny CLI test client (§0): connects to one node's RPC address, sends a
//! single `SubmitOperation`, and prints the outcome. Mirrors the
//! `SubmitOperation` probe the teacher's `client_test.py` / Raft
//! `raft_test.py` scripts perform against a running cluster, translated to
//! a one-shot Rust binary instead of a Python test harness.

use anyhow::{bail, Result};
use raft_core::rpc::{read_frame, write_frame, RaftMessage};
use std::env;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("Usage: submit <node_address> <operation> [source_id]");
    }
    let address = &args[1];
    let operation = args[2].clone();
    let source_id = args.get(3).cloned().unwrap_or_else(|| "client".to_string());

    let mut stream = TcpStream::connect(address).await?;
    let request = RaftMessage::SubmitOperation { operation, source_id };
    write_frame(&mut stream, &request).await?;

    match read_frame(&mut stream).await? {
        RaftMessage::SubmitOperationResponse { success, result, leader_id } => {
            println!("success={} leader_id={} result={}", success, leader_id, result);
            if !success {
                std::process::exit(1);
            }
        }
        other => bail!("unexpected response: {:?}", other),
    }

    Ok(())
}
