//! Line-oriented TCP chat server library
//!
//! Clients connect over plain TCP, register a unique `@handle`, list who
//! is online and send each other direct messages using a tiny text
//! protocol (`REG`, `USRS`, `MSG`).
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the central actor and sole owner of the handle → client map
//! - Each connection runs `handle_connection`, which validates requests
//!   and forwards them to the hub's register / unregister / command queues
//! - Replies reach a connection through its outbound queue, drained by a
//!   per-connection writer task
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use kelly_chat::{handle_connection, ConnectionConfig, Hub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:6969").await.unwrap();
//!     let (hub, hub_handle) = Hub::channel(256);
//!
//!     tokio::spawn(hub.run());
//!
//!     while let Ok((stream, peer)) = listener.accept().await {
//!         let hub_handle = hub_handle.clone();
//!         tokio::spawn(handle_connection(stream, peer, hub_handle, ConnectionConfig::default()));
//!     }
//! }
//! ```

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use codec::LineCodec;
pub use command::{Command, CommandKind, Departure, Registration};
pub use config::{Config, ConnectionConfig};
pub use error::{AppError, HubError, ProtocolError, SendError};
pub use handler::handle_connection;
pub use hub::{Hub, HubHandle};
pub use message::{Reply, Request, WELCOME_BANNER};
pub use types::{ClientId, Handle};
