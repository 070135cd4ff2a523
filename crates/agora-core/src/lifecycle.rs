//! Registration and unregistration of connections.
//!
//! Every registry mutation goes through [`Lifecycle`], one at a time, so
//! the presence edge (first connection in, last connection out) is decided
//! and announced without racing another mutation for the same user.

use crate::connection::{Connection, ConnectionId, ConnectionState, DisconnectReason};
use crate::error::{EnqueueError, HubError};
use crate::metrics;
use crate::presence::PresenceEvent;
use crate::registry::{Insertion, Registry, Removal};
use agora_protocol::codec;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Connections found overflowing while the control section was held.
/// They are torn down before the section is released.
type Pending = Vec<(ConnectionId, DisconnectReason)>;

pub(crate) struct Lifecycle {
    registry: Arc<Registry>,
    /// Serializes registry mutation and the presence emission tied to it.
    /// Lock order: `control`, then the registry lock.
    control: Mutex<()>,
    presence: broadcast::Sender<PresenceEvent>,
    shutdown: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new(
        registry: Arc<Registry>,
        presence_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (presence, _) = broadcast::channel(presence_capacity);
        Self {
            registry,
            control: Mutex::new(()),
            presence,
            shutdown,
        }
    }

    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.presence.subscribe()
    }

    /// Insert a `Connecting` connection into the registry.
    ///
    /// Announces the user as online when this is their first connection.
    /// The new connection receives that announcement too.
    pub(crate) fn register(&self, connection: &Arc<Connection>) -> Result<(), HubError> {
        let _control = self.control.lock();

        if self.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        if !connection.transition(ConnectionState::Connecting, ConnectionState::Registered) {
            return Err(HubError::InvalidState(connection.id().to_string()));
        }

        let first_for_user = match self.registry.insert(connection.clone()) {
            Insertion::Added { first_for_user } => first_for_user,
            Insertion::Duplicate => return Ok(()),
        };

        debug!(
            connection = %connection.id(),
            user = ?connection.user(),
            connections = self.registry.connection_count(),
            "Connection registered"
        );
        metrics::record_registered(self.registry.connection_count(), self.registry.user_count());

        if first_for_user {
            if let Some(user) = connection.user() {
                let mut pending = Pending::new();
                self.announce(PresenceEvent::online(user), &mut pending);
                self.drain(pending);
            }
        }
        Ok(())
    }

    /// Remove a connection, close its queue and stop its pumps.
    ///
    /// Returns `false` if the connection was not registered.
    pub(crate) fn unregister(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let _control = self.control.lock();
        let mut pending = Pending::new();
        let removed = self.remove(id, reason, &mut pending);
        self.drain(pending);
        removed
    }

    /// Unregister every live connection.
    pub(crate) fn unregister_all(&self, reason: DisconnectReason) -> usize {
        let _control = self.control.lock();
        let mut pending: Pending = self
            .registry
            .connection_ids()
            .into_iter()
            .map(|id| (id, reason))
            .collect();

        let mut removed = 0;
        while let Some((id, reason)) = pending.pop() {
            if self.remove(id, reason, &mut pending) {
                removed += 1;
            }
        }
        removed
    }

    /// Enqueue a frame on one connection, disconnecting it if its queue is
    /// full. Must not be called with the control section held.
    pub(crate) fn deliver(&self, connection: &Connection, frame: Bytes) -> bool {
        match connection.enqueue(frame) {
            Ok(()) => true,
            Err(EnqueueError::Full) => {
                warn!(
                    connection = %connection.id(),
                    user = ?connection.user(),
                    capacity = connection.capacity(),
                    "Outbound queue full, disconnecting"
                );
                self.unregister(connection.id(), DisconnectReason::Overflow);
                false
            }
            // Lost a race with unregistration.
            Err(EnqueueError::Closed) => false,
        }
    }

    fn drain(&self, mut pending: Pending) {
        while let Some((id, reason)) = pending.pop() {
            self.remove(id, reason, &mut pending);
        }
    }

    fn remove(&self, id: ConnectionId, reason: DisconnectReason, pending: &mut Pending) -> bool {
        let Some(Removal {
            connection,
            last_for_user,
        }) = self.registry.remove(id)
        else {
            return false;
        };

        connection.set_state(ConnectionState::Unregistering);
        connection.close_outbound();
        connection.shutdown_token().cancel();
        connection.set_state(ConnectionState::Closed);

        debug!(
            connection = %id,
            user = ?connection.user(),
            reason = %reason,
            connections = self.registry.connection_count(),
            "Connection unregistered"
        );
        metrics::record_unregistered(
            reason,
            self.registry.connection_count(),
            self.registry.user_count(),
        );

        if last_for_user {
            if let Some(user) = connection.user() {
                self.announce(PresenceEvent::offline(user), pending);
            }
        }
        true
    }

    /// Publish a presence change in-process and to every live connection.
    fn announce(&self, event: PresenceEvent, pending: &mut Pending) {
        trace!(user = %event.user_id, online = event.online, "Presence changed");
        metrics::record_presence(event.online);

        // No subscribers is fine.
        let _ = self.presence.send(event);

        let frame = match event.to_envelope().and_then(|envelope| codec::encode(&envelope)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user = %event.user_id, error = %e, "Failed to encode presence event");
                return;
            }
        };

        for connection in self.registry.connections_except(None) {
            if let Err(EnqueueError::Full) = connection.enqueue(frame.clone()) {
                warn!(
                    connection = %connection.id(),
                    user = ?connection.user(),
                    "Outbound queue full during presence broadcast, disconnecting"
                );
                pending.push((connection.id(), DisconnectReason::Overflow));
            }
        }
    }
}
