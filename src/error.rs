//! Error types for the chat server
//!
//! Three layers, matching where a failure is detected:
//! - `ProtocolError`: malformed arguments, caught by the connection actor
//! - `HubError`: state conflicts, caught by the registry
//! - `AppError`: connection-fatal transport failures
//!
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::Handle;

/// Connection-level errors
///
/// Any of these ends the affected connection only; the hub and the
/// other connections keep running.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the socket (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Incoming line was longer than the configured cap
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// No complete line arrived within the idle timeout
    #[error("idle timeout")]
    IdleTimeout,

    /// The hub's inbound queues are closed (fatal - hub is gone)
    #[error("hub closed")]
    HubClosed,

    /// The connection's own outbound queue is closed (writer task ended)
    #[error("outbound channel closed")]
    OutboundClosed,
}

/// Local validation failures for a single request line
///
/// Never reaches the hub; the actor answers with `ERR <message>` itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("must provide an username. Try: REG @johndoe")]
    MissingUsername,

    #[error("username must start with '@'. Try: REG @{0}")]
    UsernamePrefix(String),

    #[error("arguments are not expected. Try: USRS")]
    UnexpectedArguments,

    #[error("must specify a recipient (@username)")]
    MissingRecipient,

    #[error("recipient must be an user (@username)")]
    RecipientPrefix,

    #[error("body cannot be empty. Try: MSG @johndoe hello, world")]
    EmptyBody,
}

/// State conflicts detected by the hub
///
/// The hub's map is left unchanged whenever one of these is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("username taken")]
    UsernameTaken,

    #[error("already registered as {0}")]
    AlreadyRegistered(Handle),

    #[error("must register first")]
    MustRegisterFirst,

    #[error("user {0} is not connected")]
    NotConnected(Handle),

    #[error("cannot message yourself")]
    MessageYourself,
}

/// Message send errors
///
/// Occurs when a reply cannot be queued for a client. Always soft:
/// the caller logs it and moves on.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client is not draining its queue fast enough
    #[error("Channel full")]
    Full,
}
