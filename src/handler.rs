//! Connection actor
//!
//! One per accepted connection. Reads newline-terminated requests,
//! validates them locally, and forwards the rest to the hub. Replies
//! from both the actor and the hub go through one outbound queue that a
//! dedicated writer task drains onto the socket.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::codec::LineCodec;
use crate::command::{Command, CommandKind};
use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::hub::HubHandle;
use crate::message::{Reply, Request};
use crate::types::ClientId;

/// Handle a new connection
///
/// Runs until the peer closes the stream, a transport fault occurs, or
/// a configured limit is hit. The client is always unregistered before
/// this returns; errors only concern this one connection.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    hub: HubHandle,
    config: ConnectionConfig,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let client_id = ClientId::new();
    info!(%client_id, %peer, "Client connected");

    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, LineCodec::new(config.max_line_length));

    // Server -> client queue, shared with the hub for replies and deliveries
    let (reply_tx, reply_rx) = mpsc::channel::<Reply>(config.outbound_buffer);
    let mut write_task = tokio::spawn(write_replies(writer, reply_rx, client_id));

    let mut session = Session {
        client: Client::new(client_id, reply_tx),
        hub,
        config,
    };

    let result = session.run(&mut lines).await;

    let Session { client, hub, .. } = session;
    if let Err(e) = hub.unregister(client.id, client.handle.clone()).await {
        warn!(%client_id, "Could not unregister: {}", e);
    }

    // Writer ends once the hub has dropped its copy of the sender too,
    // unless the peer stopped reading and the socket is backed up
    drop(client);
    match tokio::time::timeout(config.write_drain_timeout, &mut write_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%client_id, "Writer task failed: {}", e),
        Err(_) => {
            debug!(%client_id, "Writer did not drain in time, aborting");
            write_task.abort();
        }
    }

    match &result {
        Ok(()) => info!(%client_id, %peer, "Client disconnected"),
        Err(e) => info!(%client_id, %peer, "Client dropped: {}", e),
    }

    result
}

/// Per-connection state owned by the reading side
struct Session {
    client: Client,
    hub: HubHandle,
    config: ConnectionConfig,
}

impl Session {
    async fn run<R>(&mut self, lines: &mut FramedRead<R, LineCodec>) -> Result<(), AppError>
    where
        R: AsyncRead + Unpin,
    {
        for line in Reply::welcome() {
            self.reply(line).await?;
        }

        loop {
            let line = match self.next_line(lines).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(client_id = %self.client.id, "End of stream");
                    return Ok(());
                }
                Err(e @ (AppError::LineTooLong(_) | AppError::IdleTimeout)) => {
                    let _ = self.client.send(Reply::Error(e.to_string())).await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };

            self.handle_line(&line).await?;
        }
    }

    /// Wait for the next complete line
    ///
    /// Also returns if the writer task has gone away, so a dead socket
    /// doesn't keep the reader parked.
    async fn next_line<R>(
        &self,
        lines: &mut FramedRead<R, LineCodec>,
    ) -> Result<Option<String>, AppError>
    where
        R: AsyncRead + Unpin,
    {
        let next = read_with_timeout(lines, self.config.idle_timeout);

        tokio::select! {
            _ = self.client.sender.closed() => Err(AppError::OutboundClosed),
            next = next => next?.transpose(),
        }
    }
    /// Process one request line
    async fn handle_line(&mut self, line: &str) -> Result<(), AppError> {
        let request = match Request::parse(line) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(client_id = %self.client.id, "Ignoring unrecognized line");
                return Ok(());
            }
            Err(e) => {
                debug!(client_id = %self.client.id, "Invalid request: {}", e);
                return self.reply(e.into()).await;
            }
        };

        match request {
            Request::Register(handle) => {
                if self
                    .hub
                    .register(self.client.clone(), handle.clone())
                    .await?
                {
                    self.client.handle = Some(handle);
                }
                Ok(())
            }
            Request::List => self.submit(CommandKind::List).await,
            Request::Send { recipient, body } => {
                self.submit(CommandKind::Send { recipient, body }).await
            }
        }
    }

    async fn submit(&self, kind: CommandKind) -> Result<(), AppError> {
        self.hub
            .submit(Command {
                sender: self.client.clone(),
                kind,
            })
            .await
    }

    async fn reply(&self, reply: Reply) -> Result<(), AppError> {
        self.client
            .send(reply)
            .await
            .map_err(|_| AppError::OutboundClosed)
    }
}

async fn read_with_timeout<R>(
    lines: &mut FramedRead<R, LineCodec>,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<String, AppError>>, AppError>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, lines.next())
            .await
            .map_err(|_| AppError::IdleTimeout),
        None => Ok(lines.next().await),
    }
}

/// Drain the outbound queue onto the socket
///
/// Stops at the first write failure; the reader notices the closed
/// queue and ends the session.
async fn write_replies<W>(writer: W, mut replies: mpsc::Receiver<Reply>, client_id: ClientId)
where
    W: AsyncWrite + Unpin,
{
    // Encoding only, so the length limit is never consulted
    let mut sink = FramedWrite::new(writer, LineCodec::new(usize::MAX));

    while let Some(reply) = replies.recv().await {
        if let Err(e) = sink.send(reply).await {
            debug!(%client_id, "Write failed, ending write task: {}", e);
            return;
        }
    }

    let _ = SinkExt::<Reply>::close(&mut sink).await;
    debug!(%client_id, "Write task ended");
}
