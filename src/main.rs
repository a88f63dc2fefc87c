//! Line-oriented TCP chat server - Entry Point
//!
//! Starts the TCP listener and Hub actor, accepting connections.

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kelly_chat::{handle_connection, Config, Hub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=kelly_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kelly_chat=info")),
        )
        .init();

    let config = Config::parse();
    let connection_config = config.connection();

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat server listening on {}", addr);

    let (hub, hub_handle) = Hub::channel(config.hub_buffer.max(1));
    tokio::spawn(hub.run());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let hub_handle = hub_handle.clone();

                    // Spawn an actor for each connection
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer, hub_handle, connection_config).await
                        {
                            error!(%peer, "Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    Ok(())
}
