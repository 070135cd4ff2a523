//! The hub facade.
//!
//! [`Hub`] ties the pieces together: it owns the registry, the lifecycle
//! controller and the dispatcher pool, accepts transports from the server
//! layer and exposes the collaborator API.

use crate::config::HubConfig;
use crate::connection::{Connection, ConnectionId, DisconnectReason, OutboundReceiver};
use crate::dispatcher::{self, Dispatcher, Job};
use crate::error::HubError;
use crate::lifecycle::Lifecycle;
use crate::metrics;
use crate::presence::PresenceEvent;
use crate::pump;
use crate::registry::Registry;
use agora_protocol::{Envelope, UserId};
use agora_transport::{FrameReader, FrameWriter};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub online_users: usize,
    /// Jobs waiting on the intake queue.
    pub intake_queued: usize,
    pub workers: usize,
}

/// A connection attached to the hub, with its two pump tasks.
#[derive(Debug)]
pub struct Session {
    connection: Arc<Connection>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl Session {
    /// The registered connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Shorthand for `connection().id()`.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Wait until both pumps have stopped.
    pub async fn finished(self) {
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }
}

/// The realtime connection hub.
pub struct Hub {
    config: Arc<HubConfig>,
    registry: Arc<Registry>,
    lifecycle: Arc<Lifecycle>,
    intake: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Hub {
    /// Validate `config` and start the dispatcher workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidConfig`] if the configuration is rejected.
    pub fn start(config: HubConfig) -> Result<Arc<Self>, HubError> {
        config.validate()?;
        info!(
            workers = config.workers,
            intake_capacity = config.intake_capacity,
            outbound_capacity = config.outbound_capacity,
            "Starting hub"
        );

        let config = Arc::new(config);
        let shutdown = CancellationToken::new();
        let registry = Arc::new(Registry::new());
        let lifecycle = Arc::new(Lifecycle::new(
            registry.clone(),
            config.presence_capacity,
            shutdown.clone(),
        ));

        let (intake, intake_rx) = mpsc::channel(config.intake_capacity);
        let dispatcher = Arc::new(Dispatcher::new(lifecycle.clone()));
        let workers =
            dispatcher::spawn_workers(config.workers, intake_rx, dispatcher, shutdown.clone());

        Ok(Arc::new(Self {
            config,
            registry,
            lifecycle,
            intake,
            shutdown,
            workers: Mutex::new(workers),
        }))
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Read-only view of live connections.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a transport for `user` and start its pumps.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ShuttingDown`] once [`Hub::shutdown`] has begun.
    pub fn attach<R, W>(
        &self,
        reader: R,
        writer: W,
        user: Option<UserId>,
    ) -> Result<Session, HubError>
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        let (connection, queue) = self.register(user)?;
        debug!(
            connection = %connection.id(),
            user = ?user,
            remote = ?reader.remote_addr(),
            "Attaching transport"
        );

        let inbound = {
            let connection = connection.clone();
            let lifecycle = self.lifecycle.clone();
            let intake = self.intake.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let id = connection.id();
                if let Some(reason) = pump::inbound(reader, connection, intake, config).await {
                    lifecycle.unregister(id, reason);
                }
            })
        };

        let outbound = {
            let connection = connection.clone();
            let lifecycle = self.lifecycle.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let id = connection.id();
                if let Some(reason) = pump::outbound(writer, connection, queue, config).await {
                    lifecycle.unregister(id, reason);
                }
            })
        };

        Ok(Session {
            connection,
            inbound,
            outbound,
        })
    }

    /// Attach a transport and wait until it disconnects.
    ///
    /// # Errors
    ///
    /// Same as [`Hub::attach`].
    pub async fn serve<R, W>(&self, reader: R, writer: W, user: Option<UserId>) -> Result<(), HubError>
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        self.attach(reader, writer, user)?.finished().await;
        Ok(())
    }

    /// Register a connection without a transport.
    ///
    /// The caller owns the returned queue and is responsible for draining
    /// it; useful for custom drivers and in-process consumers.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ShuttingDown`] once [`Hub::shutdown`] has begun.
    pub fn register(
        &self,
        user: Option<UserId>,
    ) -> Result<(Arc<Connection>, OutboundReceiver), HubError> {
        let (connection, queue) = Connection::new(user, self.config.outbound_capacity);
        self.lifecycle.register(&connection)?;
        Ok((connection, queue))
    }

    /// Broadcast an event to every live connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::IntakeFull`] if the event was dropped because the
    /// intake queue is full, [`HubError::ShuttingDown`] after shutdown.
    pub fn publish(&self, envelope: Envelope) -> Result<(), HubError> {
        self.submit(Job::Publish {
            envelope,
            exclude: None,
        })
    }

    /// Broadcast an event to every live connection except one.
    ///
    /// # Errors
    ///
    /// Same as [`Hub::publish`].
    pub fn publish_except(&self, envelope: Envelope, exclude: ConnectionId) -> Result<(), HubError> {
        self.submit(Job::Publish {
            envelope,
            exclude: Some(exclude),
        })
    }

    /// Deliver an event to every live connection of `user`. Nothing happens
    /// if the user is offline.
    ///
    /// # Errors
    ///
    /// Same as [`Hub::publish`].
    pub fn send_to_user(&self, user: UserId, envelope: Envelope) -> Result<(), HubError> {
        self.submit(Job::SendToUser { user, envelope })
    }

    fn submit(&self, job: Job) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        self.intake.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!("Intake queue full, dropping event");
                metrics::record_intake_drop();
                HubError::IntakeFull
            }
            TrySendError::Closed(_) => HubError::ShuttingDown,
        })
    }

    /// Whether the user has at least one live connection.
    #[must_use]
    pub fn is_online(&self, user: UserId) -> bool {
        self.registry.is_online(user)
    }

    /// Snapshot of online users.
    #[must_use]
    pub fn online_user_ids(&self) -> HashSet<UserId> {
        self.registry.online_user_ids()
    }

    /// Disconnect one connection. Returns `false` if it was not registered.
    pub fn evict(&self, id: ConnectionId) -> bool {
        self.lifecycle.unregister(id, DisconnectReason::Evicted)
    }

    /// Disconnect every connection of a user. Returns how many were removed.
    pub fn evict_user(&self, user: UserId) -> usize {
        self.registry
            .user_connections(user)
            .iter()
            .filter(|conn| self.lifecycle.unregister(conn.id(), DisconnectReason::Evicted))
            .count()
    }

    /// Stream of presence changes.
    #[must_use]
    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceEvent> {
        self.lifecycle.subscribe()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.connection_count(),
            online_users: self.registry.user_count(),
            intake_queued: self.config.intake_capacity - self.intake.capacity(),
            workers: self.config.workers,
        }
    }

    /// Whether [`Hub::shutdown`] has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Disconnect everyone, stop the workers and wait for them.
    ///
    /// Events still on the intake queue are dropped. Concurrent callers all
    /// return once the workers have stopped.
    pub async fn shutdown(&self) {
        // Held until the workers are joined; later callers wait here.
        let mut workers = self.workers.lock().await;
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        let evicted = self.lifecycle.unregister_all(DisconnectReason::Shutdown);
        for worker in workers.drain(..) {
            let _ = worker.await;
        }
        info!(evicted, "Hub stopped");
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_shutdown_waits_for_workers() {
        let hub = Hub::start(HubConfig::default()).unwrap();
        let (conn, _rx) = hub.register(Some(UserId(1))).unwrap();

        let second = async {
            hub.shutdown().await;
            // The intake receiver goes away with the last worker.
            hub.intake.is_closed()
        };
        let ((), workers_stopped) = tokio::join!(hub.shutdown(), second);

        assert!(workers_stopped);
        assert!(conn.is_closing());
        assert_eq!(hub.stats().connections, 0);
    }
}
