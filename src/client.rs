//! Client struct definition
//!
//! The registry's view of a connection: who it is and how to reach it.
//! The socket itself stays with the connection actor; this only holds
//! the sending half of the actor's outbound queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::Reply;
use crate::types::{ClientId, Handle};

/// Send capability for one connected client
///
/// Cloning is cheap; every clone feeds the same writer task.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Registered handle (None until the hub accepts a REG)
    pub handle: Option<Handle>,
    /// Server → Client line queue
    pub sender: mpsc::Sender<Reply>,
}

impl Client {
    /// Create an anonymous client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<Reply>) -> Self {
        Self {
            id,
            handle: None,
            sender,
        }
    }

    /// Queue a reply, waiting for room in the outbound buffer
    ///
    /// Used by the connection actor for its own replies.
    pub async fn send(&self, reply: Reply) -> Result<(), SendError> {
        self.sender
            .send(reply)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a reply without waiting
    ///
    /// Used by the hub so a slow reader can never stall the hub loop.
    pub fn try_send(&self, reply: Reply) -> Result<(), SendError> {
        self.sender.try_send(reply).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Check if this client has a registered handle
    pub fn is_registered(&self) -> bool {
        self.handle.is_some()
    }

    /// Handle for log output, "-" while anonymous
    pub fn display_name(&self) -> &str {
        self.handle.as_ref().map(Handle::as_str).unwrap_or("-")
    }
}
