//! Authoritative Gomoku session server entry point: binds the listener,
//! spawns the single dispatcher, accepts connections forever.

use clap::Parser;
use session_server::config::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = ServerConfig::parse();
    let listener = session_server::bind_listener(&config)?;
    tracing::info!(addr = %config.bind_addr(), "session server listening");

    session_server::serve(listener, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
