//! Mock event stream server
//!
//! Stands in for the family-finance backend during local development.
//!
//! Behavior:
//! 1. Listens for WebSocket clients on a configurable port (default 4000)
//! 2. Pushes one envelope every `--interval-ms`, rotating through the built-in types
//! 3. Optionally mixes in unknown-type and malformed frames (`--noise-every N`)
//! 4. Logs every text frame a client sends
//!
//! Usage:
//!   cargo run --bin mock_events -- --port 4000 --interval-ms 1500

use clap::Parser;
use famfin_core::domain::{EventEnvelope, EventType};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mock_events")]
#[command(about = "Mock family-finance event stream for local development")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "4000")]
    port: u16,

    /// Delay between pushed envelopes (ms)
    #[arg(long, default_value = "1500")]
    interval_ms: u64,

    /// Every Nth frame is an unknown type or malformed JSON (0 = never)
    #[arg(long, default_value = "0")]
    noise_every: u64,

    /// Value of the `source` field on pushed envelopes
    #[arg(long, default_value = "mock")]
    source: String,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Realistic payload for the n-th pushed envelope
fn mock_payload(event_type: &EventType, seq: u64) -> Map<String, Value> {
    let kid_id = format!("kid-{}", seq % 3 + 1);
    let value = match event_type {
        EventType::WalletUpdate => json!({
            "action": "BALANCE_UPDATE",
            "kidId": kid_id,
            "walletId": format!("wallet-{}", seq % 3 + 1),
            "balance": 10.0 + (seq % 20) as f64 * 2.5,
        }),
        EventType::ChoreUpdate => json!({
            "action": if seq % 2 == 0 { "COMPLETED" } else { "ASSIGNED" },
            "choreId": format!("chore-{}", seq),
            "kidId": kid_id,
            "status": if seq % 2 == 0 { "done" } else { "pending" },
        }),
        EventType::TransactionUpdate => json!({
            "action": "CREATED",
            "transactionId": format!("tx-{}", seq),
            "kidId": kid_id,
            "amount": (seq % 7 + 1) as f64,
        }),
        EventType::KidUpdate => json!({ "action": "UPDATED", "kidId": kid_id }),
        EventType::AllowanceUpdate => json!({
            "action": "PAID",
            "kidId": kid_id,
            "amount": 5.0,
            "frequency": "weekly",
        }),
        EventType::GoalUpdate => json!({
            "action": "CONTRIBUTE",
            "goalId": format!("goal-{}", seq % 4),
            "kidId": kid_id,
            "progress": (seq % 10) as f64 / 10.0,
        }),
        EventType::ProfileUpdate => json!({ "action": "UPDATED", "userId": "parent-1" }),
        EventType::Extension(_) => json!({ "action": "UPDATED" }),
    };
    object(value)
}

/// Frame for sequence number `seq`, including injected noise
fn next_frame(args: &Args, seq: u64) -> String {
    if args.noise_every > 0 && seq > 0 && seq % args.noise_every == 0 {
        return if (seq / args.noise_every) % 2 == 0 {
            "{\"type\":\"WALLET_UPDATE\",\"payload\":".to_string()
        } else {
            json!({ "type": "MYSTERY_UPDATE", "payload": {}, "timestamp": seq }).to_string()
        };
    }

    let builtin = &EventType::BUILTIN;
    let event_type = builtin[(seq as usize) % builtin.len()].clone();
    let payload = mock_payload(&event_type, seq);
    EventEnvelope::new(event_type, payload).with_source(args.source.as_str()).to_json()
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, args: Arc<Args>) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, error = %e, "websocket_handshake_failed");
            return;
        }
    };
    info!(peer = %peer, "client_connected");

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let frame = next_frame(&args, seq);
                seq += 1;
                debug!(peer = %peer, seq = %seq, frame = %frame, "frame_pushed");
                if let Err(e) = ws.send(Message::Text(frame)).await {
                    warn!(peer = %peer, error = %e, "push_failed");
                    break;
                }
            }
            inbound = ws.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        info!(peer = %peer, frame = %text, "client_frame_received");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(peer = %peer, error = %e, "receive_failed");
                        break;
                    }
                }
            }
        }
    }

    info!(peer = %peer, pushed = %seq, "client_disconnected");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Arc::new(Args::parse());

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(
        port = %args.port,
        interval_ms = %args.interval_ms,
        noise_every = %args.noise_every,
        "mock_events listening"
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(handle_client(stream, peer, args.clone()));
    }
}
