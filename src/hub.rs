//! Hub actor implementation
//!
//! The single owner of the handle → client map. Connection actors never
//! touch the map; they submit messages on three queues (register,
//! unregister, command) and the hub applies them one at a time, so the
//! map needs no lock and a handle can only ever be held by one client.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::command::{Command, CommandKind, Departure, Registration};
use crate::error::{AppError, HubError, SendError};
use crate::message::Reply;
use crate::types::{ClientId, Handle};

/// Submission side of the hub's queues
///
/// Each connection actor holds a clone. The hub stops once every clone
/// is dropped.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Departure>,
    command_tx: mpsc::Sender<Command>,
}

impl HubHandle {
    /// Ask the hub to register `client` under `handle`
    ///
    /// The hub writes `OK` or `ERR ...` to the client directly; the
    /// returned bool says whether the client now holds the handle.
    pub async fn register(&self, client: Client, handle: Handle) -> Result<bool, AppError> {
        let (outcome, outcome_rx) = oneshot::channel();
        self.register_tx
            .send(Registration {
                client,
                handle,
                outcome,
            })
            .await
            .map_err(|_| AppError::HubClosed)?;

        outcome_rx.await.map_err(|_| AppError::HubClosed)
    }

    /// Tell the hub a client is leaving
    pub async fn unregister(
        &self,
        client_id: ClientId,
        handle: Option<Handle>,
    ) -> Result<(), AppError> {
        self.unregister_tx
            .send(Departure { client_id, handle })
            .await
            .map_err(|_| AppError::HubClosed)
    }

    /// Submit a LIST or SEND command
    pub async fn submit(&self, command: Command) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AppError::HubClosed)
    }
}

/// The hub actor
///
/// Owns the registry and processes every mutation on one task.
pub struct Hub {
    /// Registered clients: Handle -> Client
    clients: HashMap<Handle, Client>,
    /// Reverse index: ClientId -> Handle
    handles: HashMap<ClientId, Handle>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Departure>,
    command_rx: mpsc::Receiver<Command>,
}

impl Hub {
    /// Create a hub and its submission handle, each queue holding `buffer` messages
    pub fn channel(buffer: usize) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(buffer);
        let (unregister_tx, unregister_rx) = mpsc::channel(buffer);
        let (command_tx, command_rx) = mpsc::channel(buffer);

        let hub = Self {
            clients: HashMap::new(),
            handles: HashMap::new(),
            register_rx,
            unregister_rx,
            command_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            command_tx,
        };
        (hub, handle)
    }

    /// Run the hub event loop
    ///
    /// The three queues are polled fairly. Before a lifecycle message is
    /// applied, the commands already queued at that moment are handled
    /// first: an actor only submits its next message after the previous
    /// one is queued (and after a registration is answered), so this keeps
    /// each actor's messages FIFO across the queues. Across actors the
    /// order is whatever the queues deliver: two racing REGs for the same
    /// handle are settled by whichever is dequeued first.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => self.handle_command(cmd),
                Some(dep) = self.unregister_rx.recv() => {
                    self.drain_commands();
                    self.handle_unregister(dep);
                }
                Some(reg) = self.register_rx.recv() => {
                    self.drain_commands();
                    self.handle_register(reg);
                }
                else => break,
            }
        }

        info!("Hub shutting down");
    }

    /// Handle the commands queued right now, and no more
    ///
    /// Bounded by the queue length on entry so a busy command queue
    /// can't hold a lifecycle message back indefinitely.
    fn drain_commands(&mut self) {
        for _ in 0..self.command_rx.len() {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => break,
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd.kind {
            CommandKind::List => self.handle_list(&cmd.sender),
            CommandKind::Send { recipient, body } => {
                if let Err(e) = self.route(&cmd.sender, &recipient, body) {
                    debug!(client_id = %cmd.sender.id, "Rejected message: {}", e);
                    deliver(&cmd.sender, e.into());
                }
            }
        }
    }

    /// Handle a registration request
    fn handle_register(&mut self, reg: Registration) {
        let Registration {
            mut client,
            handle,
            outcome,
        } = reg;

        if let Err(e) = self.check_register(client.id, &handle) {
            debug!(client_id = %client.id, handle = %handle, "Registration refused: {}", e);
            deliver(&client, e.into());
            let _ = outcome.send(false);
            return;
        }

        let client_id = client.id;
        client.handle = Some(handle.clone());
        deliver(&client, Reply::Ok);
        self.clients.insert(handle.clone(), client);
        self.handles.insert(client_id, handle.clone());

        if outcome.send(true).is_err() {
            // Actor went away before hearing back; don't keep a dead entry
            self.remove(client_id, &handle);
            return;
        }

        info!(handle = %handle, "Client registered");
        debug!("Total registered clients: {}", self.clients.len());
    }

    fn check_register(&self, client_id: ClientId, handle: &Handle) -> Result<(), HubError> {
        if let Some(current) = self.handle_of(client_id) {
            return Err(HubError::AlreadyRegistered(current.clone()));
        }
        if self.clients.contains_key(handle) {
            return Err(HubError::UsernameTaken);
        }
        Ok(())
    }

    /// Handle a departing client
    ///
    /// Removes the entry only if it belongs to this exact client, so a
    /// stale or repeated departure can't evict someone else.
    fn handle_unregister(&mut self, dep: Departure) {
        let Some(handle) = dep.handle else {
            return;
        };

        let owned = self
            .clients
            .get(&handle)
            .is_some_and(|c| c.id == dep.client_id);

        if owned {
            self.remove(dep.client_id, &handle);
            info!(handle = %handle, "Client unregistered");
            debug!("Total registered clients: {}", self.clients.len());
        }
    }

    /// Reply with every registered handle
    fn handle_list(&self, sender: &Client) {
        let handles: Vec<Handle> = self.clients.keys().cloned().collect();
        deliver(sender, Reply::Users(handles));
    }

    /// Route a direct message
    ///
    /// Silent on success; the sender hears nothing back.
    fn route(&self, sender: &Client, recipient: &Handle, body: String) -> Result<(), HubError> {
        let from = self
            .handle_of(sender.id)
            .ok_or(HubError::MustRegisterFirst)?;

        let target = self
            .clients
            .get(recipient)
            .ok_or_else(|| HubError::NotConnected(recipient.clone()))?;

        if target.id == sender.id {
            return Err(HubError::MessageYourself);
        }

        debug!(from = %from, to = %recipient, "Routing message");
        deliver(
            target,
            Reply::Delivery {
                from: from.clone(),
                body,
            },
        );
        Ok(())
    }

    /// Handle currently held by `client_id`, according to the map
    fn handle_of(&self, client_id: ClientId) -> Option<&Handle> {
        self.handles.get(&client_id)
    }

    fn remove(&mut self, client_id: ClientId, handle: &Handle) {
        self.clients.remove(handle);
        self.handles.remove(&client_id);
    }
}

/// Queue a reply without blocking the hub
///
/// Failures are logged and dropped; a dead or slow client never
/// affects anyone else.
fn deliver(client: &Client, reply: Reply) {
    match client.try_send(reply) {
        Ok(()) => {}
        Err(SendError::ChannelClosed) => {
            debug!(client_id = %client.id, "Dropped reply for closed connection");
        }
        Err(SendError::Full) => {
            warn!(
                client_id = %client.id,
                handle = client.display_name(),
                "Outbound queue full, dropping reply"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> Handle {
        Handle::parse(name).unwrap()
    }

    fn new_client() -> (Client, mpsc::Receiver<Reply>) {
        let (tx, rx) = mpsc::channel(32);
        (Client::new(ClientId::new(), tx), rx)
    }

    fn hub() -> Hub {
        Hub::channel(16).0
    }

    fn register(hub: &mut Hub, client: &Client, name: &str) -> bool {
        let (outcome, mut outcome_rx) = oneshot::channel();
        hub.handle_register(Registration {
            client: client.clone(),
            handle: handle(name),
            outcome,
        });
        outcome_rx.try_recv().unwrap()
    }

    fn registered(client: &Client, name: &str) -> Client {
        let mut client = client.clone();
        client.handle = Some(handle(name));
        client
    }

    fn send(hub: &mut Hub, sender: &Client, to: &str, body: &str) {
        hub.handle_command(Command {
            sender: sender.clone(),
            kind: CommandKind::Send {
                recipient: handle(to),
                body: body.to_string(),
            },
        });
    }

    fn list(hub: &mut Hub, sender: &Client) {
        hub.handle_command(Command {
            sender: sender.clone(),
            kind: CommandKind::List,
        });
    }

    #[test]
    fn test_register_replies_ok() {
        let mut hub = hub();
        let (alice, mut rx) = new_client();

        assert!(register(&mut hub, &alice, "@alice"));
        assert_eq!(rx.try_recv().unwrap(), Reply::Ok);
        assert_eq!(hub.clients.len(), 1);
    }

    #[test]
    fn test_register_taken_handle_keeps_first_owner() {
        let mut hub = hub();
        let (first, _rx1) = new_client();
        let (second, mut rx2) = new_client();

        assert!(register(&mut hub, &first, "@a"));
        assert!(!register(&mut hub, &second, "@a"));

        assert_eq!(
            rx2.try_recv().unwrap(),
            Reply::Error("username taken".to_string())
        );
        assert_eq!(hub.clients.get(&handle("@a")).unwrap().id, first.id);
    }

    #[test]
    fn test_reregister_is_rejected() {
        let mut hub = hub();
        let (alice, mut rx) = new_client();

        assert!(register(&mut hub, &alice, "@alice"));
        assert!(!register(&mut hub, &alice, "@other"));

        assert_eq!(rx.try_recv().unwrap(), Reply::Ok);
        assert_eq!(
            rx.try_recv().unwrap(),
            Reply::Error("already registered as @alice".to_string())
        );
        assert_eq!(hub.clients.len(), 1);
        assert!(hub.clients.contains_key(&handle("@alice")));
    }

    #[test]
    fn test_register_dropped_outcome_leaves_no_entry() {
        let mut hub = hub();
        let (alice, _rx) = new_client();
        let (outcome, outcome_rx) = oneshot::channel();
        drop(outcome_rx);

        hub.handle_register(Registration {
            client: alice,
            handle: handle("@alice"),
            outcome,
        });
        assert!(hub.clients.is_empty());
        assert!(hub.handles.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut hub = hub();
        let (alice, _rx) = new_client();
        let (bob, _rx2) = new_client();
        register(&mut hub, &alice, "@alice");
        register(&mut hub, &bob, "@bob");

        let dep = Departure {
            client_id: alice.id,
            handle: Some(handle("@alice")),
        };
        hub.handle_unregister(dep.clone());
        hub.handle_unregister(dep);
        hub.handle_unregister(Departure {
            client_id: ClientId::new(),
            handle: None,
        });

        assert_eq!(hub.clients.len(), 1);
        assert!(hub.clients.contains_key(&handle("@bob")));
    }

    #[test]
    fn test_unregister_ignores_other_owner() {
        let mut hub = hub();
        let (alice, _rx) = new_client();
        register(&mut hub, &alice, "@alice");

        hub.handle_unregister(Departure {
            client_id: ClientId::new(),
            handle: Some(handle("@alice")),
        });
        assert!(hub.clients.contains_key(&handle("@alice")));
    }

    #[test]
    fn test_list_returns_all_handles() {
        let mut hub = hub();
        let (a, mut rx_a) = new_client();
        let (b, _rx_b) = new_client();
        let (anon, mut rx_anon) = new_client();
        register(&mut hub, &a, "@a");
        register(&mut hub, &b, "@b");
        rx_a.try_recv().unwrap();

        list(&mut hub, &anon);

        let Reply::Users(mut names) = rx_anon.try_recv().unwrap() else {
            panic!("expected user listing");
        };
        names.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(names, vec![handle("@a"), handle("@b")]);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_list_when_empty() {
        let mut hub = hub();
        let (anon, mut rx) = new_client();

        list(&mut hub, &anon);
        assert_eq!(rx.try_recv().unwrap().to_string(), "");
    }

    #[test]
    fn test_route_delivers_to_recipient_only() {
        let mut hub = hub();
        let (a, mut rx_a) = new_client();
        let (b, mut rx_b) = new_client();
        register(&mut hub, &a, "@a");
        register(&mut hub, &b, "@b");
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();

        send(&mut hub, &registered(&a, "@a"), "@b", "hello world");

        assert_eq!(rx_b.try_recv().unwrap().to_string(), "@a: hello world");
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_route_rejects_self_message() {
        let mut hub = hub();
        let (a, mut rx_a) = new_client();
        register(&mut hub, &a, "@a");
        rx_a.try_recv().unwrap();

        send(&mut hub, &registered(&a, "@a"), "@a", "hi");

        assert_eq!(
            rx_a.try_recv().unwrap(),
            Reply::Error("cannot message yourself".to_string())
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_route_requires_registration() {
        let mut hub = hub();
        let (anon, mut rx) = new_client();
        let (b, mut rx_b) = new_client();
        register(&mut hub, &b, "@b");
        rx_b.try_recv().unwrap();

        send(&mut hub, &anon, "@b", "hi");

        assert_eq!(
            rx.try_recv().unwrap(),
            Reply::Error("must register first".to_string())
        );
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.clients.len(), 1);
    }

    #[test]
    fn test_route_ignores_forged_sender_handle() {
        let mut hub = hub();
        let (b, mut rx_b) = new_client();
        let (mallory, mut rx_m) = new_client();
        register(&mut hub, &b, "@b");
        rx_b.try_recv().unwrap();

        send(&mut hub, &registered(&mallory, "@b"), "@b", "hi");

        assert_eq!(
            rx_m.try_recv().unwrap(),
            Reply::Error("must register first".to_string())
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_route_unknown_recipient() {
        let mut hub = hub();
        let (a, mut rx_a) = new_client();
        register(&mut hub, &a, "@a");
        rx_a.try_recv().unwrap();

        send(&mut hub, &registered(&a, "@a"), "@ghost", "hi");

        assert_eq!(
            rx_a.try_recv().unwrap(),
            Reply::Error("user @ghost is not connected".to_string())
        );
    }

    #[test]
    fn test_route_to_closed_connection_is_soft() {
        let mut hub = hub();
        let (a, _rx_a) = new_client();
        let (b, rx_b) = new_client();
        register(&mut hub, &a, "@a");
        register(&mut hub, &b, "@b");
        drop(rx_b);

        send(&mut hub, &registered(&a, "@a"), "@b", "anyone there?");
        assert_eq!(hub.clients.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_registration_has_one_winner() {
        let (hub, handle_tx) = Hub::channel(64);
        tokio::spawn(hub.run());

        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..16 {
            let (client, rx) = new_client();
            receivers.push(rx);
            let hub = handle_tx.clone();
            tasks.push(tokio::spawn(async move {
                hub.register(client, handle("@same")).await.unwrap()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_handles_dropped() {
        let (hub, handle_tx) = Hub::channel(4);
        let task = tokio::spawn(hub.run());
        drop(handle_tx);
        task.await.unwrap();
    }

    #[test]
    fn test_reverse_index_follows_map() {
        let mut hub = hub();
        let (alice, _rx) = new_client();
        register(&mut hub, &alice, "@alice");
        assert_eq!(hub.handles.get(&alice.id), Some(&handle("@alice")));

        hub.handle_unregister(Departure {
            client_id: alice.id,
            handle: Some(handle("@alice")),
        });
        assert!(hub.handles.is_empty());

        // Free to register again once gone
        assert!(register(&mut hub, &alice, "@alice2"));
        assert_eq!(hub.handles.get(&alice.id), Some(&handle("@alice2")));
    }

    #[tokio::test]
    async fn test_commands_before_registration_are_applied_first() {
        // The loop picks among ready queues at random; repeat so both
        // orders of the first pick are exercised
        for _ in 0..20 {
            let (hub, handle_tx) = Hub::channel(16);
            let (alice, mut rx) = new_client();

            handle_tx
                .submit(Command {
                    sender: alice.clone(),
                    kind: CommandKind::Send {
                        recipient: handle("@bob"),
                        body: "too early".to_string(),
                    },
                })
                .await
                .unwrap();

            let registering = {
                let handle_tx = handle_tx.clone();
                tokio::spawn(async move { handle_tx.register(alice, handle("@alice")).await })
            };
            // Let the registration reach its queue before the hub starts
            tokio::task::yield_now().await;

            tokio::spawn(hub.run());
            assert!(registering.await.unwrap().unwrap());

            assert_eq!(
                rx.recv().await,
                Some(Reply::Error("must register first".to_string()))
            );
            assert_eq!(rx.recv().await, Some(Reply::Ok));
        }
    }

    #[tokio::test]
    async fn test_drain_is_bounded_by_queue_length() {
        let (mut hub, handle_tx) = Hub::channel(16);
        let (anon, mut rx) = new_client();

        for _ in 0..3 {
            handle_tx
                .submit(Command {
                    sender: anon.clone(),
                    kind: CommandKind::List,
                })
                .await
                .unwrap();
        }

        hub.drain_commands();
        for _ in 0..3 {
            assert_eq!(rx.try_recv().unwrap(), Reply::Users(Vec::new()));
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.command_rx.len(), 0);
    }
}
