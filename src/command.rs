//! Messages submitted from connection actors to the hub
//!
//! Three shapes, one per hub queue: lifecycle registration, lifecycle
//! departure, and commands (LIST / SEND). All are owned by the hub once
//! submitted.

use tokio::sync::oneshot;

use crate::client::Client;
use crate::types::{ClientId, Handle};

/// What a command asks the hub to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// List every registered handle back to the sender
    List,
    /// Route `body` to `recipient`
    Send { recipient: Handle, body: String },
}

/// A validated request bound for the hub's command queue
#[derive(Debug)]
pub struct Command {
    /// Issuing client, used for replies and sender identity
    pub sender: Client,
    pub kind: CommandKind,
}

/// Request to claim `handle` for `client`
///
/// The hub writes `OK`/`ERR` to the client itself and reports the
/// outcome on `outcome` so the actor knows whether it now holds the handle.
#[derive(Debug)]
pub struct Registration {
    pub client: Client,
    pub handle: Handle,
    pub outcome: oneshot::Sender<bool>,
}

/// Notice that a connection is going away
///
/// Safe to submit for anonymous clients and more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub client_id: ClientId,
    pub handle: Option<Handle>,
}
