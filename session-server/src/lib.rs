//! Authoritative Gomoku session server, exposed as a library so integration
//! tests (and `main.rs`) can drive a real instance over loopback TCP instead
//! of re-implementing its wiring against fakes.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod state;

use config::ServerConfig;
use dispatcher::{ClientEvent, DispatcherConfig};
use state::AppState;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Binds the TCP listener with `SO_REUSEADDR` and the configured backlog
/// (tokio's `TcpListener::bind` doesn't expose backlog control directly).
pub fn bind_listener(config: &ServerConfig) -> Result<TcpListener, error::StartupError> {
    use socket2::{Domain, Socket, Type};

    let bind_err = |source: std::io::Error| error::StartupError::Bind {
        addr: config.bind_addr(),
        source,
    };

    let addr: SocketAddr = config.bind_addr().parse().map_err(|_| {
        bind_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid bind address {}", config.bind_addr()),
        ))
    })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(config.backlog as i32).map_err(bind_err)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(bind_err)
}

fn spawn_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    client_seq: &AtomicU64,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    max_frame_bytes: usize,
    idle_read_timeout: Duration,
    idle_silence_budget: Duration,
) {
    let seq = client_seq.fetch_add(1, Ordering::Relaxed);
    let unix_ts = protocol::unix_timestamp() as u64;
    let client_id = state::format_client_id(seq, unix_ts);
    tracing::info!(%peer_addr, %client_id, "new connection");

    tokio::spawn(connection::handle_connection(
        stream,
        peer_addr,
        client_id,
        events_tx,
        max_frame_bytes,
        idle_read_timeout,
        idle_silence_budget,
    ));
}

/// Runs the acceptor loop against an already-bound listener until `shutdown`
/// resolves, dispatching every accepted connection to a single dispatcher
/// task. Split out from `main` so integration tests can bind an ephemeral
/// port (`ServerConfig::bind_port = 0`) and drive a real server without a
/// process boundary.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: impl std::future::Future<Output = ()>,
) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel::<ClientEvent>();

    let dispatcher_config = DispatcherConfig {
        reaper_poll: Duration::from_secs(config.reaper_poll_secs),
        ping_deadline: Duration::from_secs(config.ping_deadline_secs),
    };
    let app_state = AppState::new(config.move_time_limit_secs);
    let dispatcher_handle = tokio::spawn(dispatcher::run(app_state, events_rx, dispatcher_config));

    let client_seq = AtomicU64::new(1);
    let max_frame_bytes = config.max_frame_bytes;
    let idle_read_timeout = Duration::from_secs(config.accept_timeout_secs);
    let idle_silence_budget = Duration::from_secs(config.idle_silence_secs);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(%err, "accept error");
                        continue;
                    }
                };
                spawn_connection(
                    stream,
                    peer_addr,
                    &client_seq,
                    events_tx.clone(),
                    max_frame_bytes,
                    idle_read_timeout,
                    idle_silence_budget,
                );
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, stopping acceptor");
                break;
            }
        }
    }

    drop(events_tx);
    dispatcher_handle.await.ok();
    Ok(())
}

/// Binds the configured address and returns both the listener's actual local
/// address (useful when `bind_port = 0`) and a future that runs the server
/// until `shutdown` resolves.
pub fn bind_and_serve(
    config: ServerConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<(SocketAddr, impl std::future::Future<Output = anyhow::Result<()>>)> {
    let listener = bind_listener(&config)?;
    let local_addr = listener.local_addr()?;
    Ok((local_addr, serve(listener, config, shutdown)))
}
