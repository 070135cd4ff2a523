//! The dispatcher worker pool.
//!
//! Every connection and every collaborator call feeds one bounded intake
//! queue. A fixed number of workers pull jobs from it and route each one
//! end-to-end: resolve the recipients, encode once, enqueue a copy per
//! recipient.

use crate::connection::{Connection, ConnectionId};
use crate::lifecycle::Lifecycle;
use crate::metrics;
use agora_protocol::payloads::{direct_target, validate_broadcast};
use agora_protocol::{codec, Envelope, EventKind, ProtocolError, Route, UserId};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A unit of work on the intake queue.
#[derive(Debug)]
pub(crate) enum Job {
    /// An envelope a client sent; routed by its kind.
    Inbound {
        origin: Arc<Connection>,
        envelope: Envelope,
    },
    /// Collaborator broadcast.
    Publish {
        envelope: Envelope,
        exclude: Option<ConnectionId>,
    },
    /// Collaborator direct send.
    SendToUser { user: UserId, envelope: Envelope },
}

pub(crate) struct Dispatcher {
    lifecycle: Arc<Lifecycle>,
}

impl Dispatcher {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Route one job. Returns the number of connections that got a copy.
    pub(crate) fn dispatch(&self, job: Job) -> usize {
        match job {
            Job::Inbound { origin, envelope } => self.route_inbound(&origin, &envelope),
            Job::Publish { envelope, exclude } => {
                let targets = self.lifecycle.registry().connections_except(exclude);
                self.fan_out(Route::Broadcast, &envelope, &targets)
            }
            Job::SendToUser { user, envelope } => {
                let targets = self.lifecycle.registry().user_connections(user);
                self.fan_out(Route::Direct, &envelope, &targets)
            }
        }
    }

    fn route_inbound(&self, origin: &Arc<Connection>, envelope: &Envelope) -> usize {
        let kind = envelope.kind();
        match kind.route() {
            Route::Direct => match direct_target(kind, envelope.payload()) {
                Ok(target) => {
                    let targets = self.lifecycle.registry().user_connections(target);
                    if targets.is_empty() {
                        trace!(kind = %kind, target = %target, "Target offline, dropping");
                    }
                    self.fan_out(Route::Direct, envelope, &targets)
                }
                Err(e) => {
                    self.reject(origin, kind, &e);
                    0
                }
            },
            Route::Broadcast => match validate_broadcast(kind, envelope.payload()) {
                Ok(()) => {
                    let targets = self.lifecycle.registry().connections_except(Some(origin.id()));
                    self.fan_out(Route::Broadcast, envelope, &targets)
                }
                Err(e) => {
                    self.reject(origin, kind, &e);
                    0
                }
            },
            Route::Reply => {
                let pong = Envelope::bare(EventKind::Pong);
                self.fan_out(Route::Reply, &pong, std::slice::from_ref(origin))
            }
            Route::HubOnly | Route::Discard => {
                debug!(connection = %origin.id(), kind = %kind, "Dropping event not accepted from clients");
                0
            }
        }
    }

    fn reject(&self, origin: &Connection, kind: &EventKind, error: &ProtocolError) {
        warn!(connection = %origin.id(), kind = %kind, error = %error, "Invalid payload, dropping");
        metrics::record_decode_error("payload");
    }

    fn fan_out(&self, route: Route, envelope: &Envelope, targets: &[Arc<Connection>]) -> usize {
        if targets.is_empty() {
            metrics::record_routed(route.as_str(), 0);
            return 0;
        }

        let frame: Bytes = match codec::encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = %envelope.kind(), error = %e, "Failed to encode event");
                return 0;
            }
        };

        let delivered = targets
            .iter()
            .filter(|conn| self.lifecycle.deliver(conn, frame.clone()))
            .count();

        trace!(
            kind = %envelope.kind(),
            route = route.as_str(),
            recipients = delivered,
            "Routed event"
        );
        metrics::record_routed(route.as_str(), delivered);
        delivered
    }
}

/// Start `count` workers sharing one intake receiver.
///
/// Workers stop when `shutdown` is cancelled or every intake sender is gone.
pub(crate) fn spawn_workers(
    count: usize,
    intake: mpsc::Receiver<Job>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let intake = Arc::new(Mutex::new(intake));
    (0..count)
        .map(|worker| {
            let intake = intake.clone();
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                trace!(worker, "Dispatcher worker started");
                loop {
                    // Hold the receiver only while waiting, never while routing.
                    let job = {
                        let mut intake = intake.lock().await;
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => None,
                            job = intake.recv() => job,
                        }
                    };
                    match job {
                        Some(job) => {
                            dispatcher.dispatch(job);
                        }
                        None => break,
                    }
                }
                trace!(worker, "Dispatcher worker stopped");
            })
        })
        .collect()
}
