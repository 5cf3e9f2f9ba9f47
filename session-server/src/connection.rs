//! Per-connection plumbing: one reader task framing and decoding inbound
//! bytes, one writer task serializing outbound envelopes, paired the way
//! the teacher pairs a send/receive task per WebSocket and aborts the
//! loser (§4.3.1 — "one reader per connection").

use protocol::{ClientId, ClientMessage, Envelope, Framer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dispatcher::ClientEvent;
use crate::error::ConnectionError;

/// Drives a single accepted connection start to finish: registers with the
/// dispatcher, runs the reader loop until the peer goes away, then tells
/// the dispatcher so the disconnect cascade (§4.3.3) can run.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    client_id: ClientId,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    max_frame_bytes: usize,
    idle_read_timeout: Duration,
    idle_silence_budget: Duration,
) {
    let (read_half, write_half) = stream.into_split();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    if events_tx
        .send(ClientEvent::Connected {
            client_id: client_id.clone(),
            outbox: outbox_tx,
        })
        .is_err()
    {
        return; // dispatcher already gone (shutting down)
    }

    let mut writer_task = tokio::spawn(writer_loop(write_half, outbox_rx));
    // I/O errors at this boundary (§7 item 4) are always treated as a
    // disconnection, never propagated further.
    let result = reader_loop(
        read_half,
        &client_id,
        &events_tx,
        max_frame_bytes,
        idle_read_timeout,
        idle_silence_budget,
    )
    .await;
    writer_task.abort();

    events_tx
        .send(ClientEvent::Disconnected {
            client_id: client_id.clone(),
        })
        .ok();
    match result {
        Ok(()) => info!(%peer_addr, %client_id, "connection closed by peer"),
        Err(err) => info!(%peer_addr, %client_id, %err, "connection closed"),
    }
}

/// Polls the socket in `idle_read_timeout` slices, closing the connection
/// itself once `idle_silence_budget` of continuous silence elapses — a
/// tighter, independent check than the reaper's `ping_deadline` sweep
/// (§5: "a connection is torn down only after 60s of silence (the
/// reader's own check) or 90s (the reaper's check)").
async fn reader_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    client_id: &ClientId,
    events_tx: &mpsc::UnboundedSender<ClientEvent>,
    max_frame_bytes: usize,
    idle_read_timeout: Duration,
    idle_silence_budget: Duration,
) -> Result<(), ConnectionError> {
    let mut framer = Framer::new(max_frame_bytes);
    let mut buf = vec![0u8; 4096];
    let mut last_read_at = tokio::time::Instant::now();

    loop {
        let read_result = tokio::time::timeout(idle_read_timeout, read_half.read(&mut buf)).await;
        let n = match read_result {
            Ok(Ok(0)) => return Err(ConnectionError::Closed),
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(ConnectionError::Io(err)),
            Err(_elapsed) => {
                if last_read_at.elapsed() >= idle_silence_budget {
                    return Err(ConnectionError::IdleTimeout(idle_silence_budget));
                }
                continue;
            }
        };

        last_read_at = tokio::time::Instant::now();
        let decoded = framer.feed(&buf[..n])?;
        for result in decoded {
            dispatch_decoded(client_id, events_tx, result);
        }
    }
}

fn dispatch_decoded(
    client_id: &ClientId,
    events_tx: &mpsc::UnboundedSender<ClientEvent>,
    result: Result<Envelope, protocol::FrameDecodeError>,
) {
    let envelope = match result {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%client_id, %err, "malformed frame dropped");
            return;
        }
    };
    match ClientMessage::try_from(envelope) {
        Ok(message) => {
            events_tx
                .send(ClientEvent::Message {
                    client_id: client_id.clone(),
                    message,
                })
                .ok();
        }
        Err(err) => {
            warn!(%client_id, %err, "payload did not match expected shape, dropped");
        }
    }
}

async fn writer_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut outbox_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = outbox_rx.recv().await {
        if let Err(err) = write_half.write_all(&bytes).await {
            warn!(%err, "write error, closing connection");
            return;
        }
    }
}
