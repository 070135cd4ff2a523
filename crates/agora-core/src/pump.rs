//! The two per-connection loops.
//!
//! The inbound pump reads frames, decodes them and hands them to the
//! dispatcher. The outbound pump drains the connection's queue onto the
//! transport and keeps the peer alive with pings. Each returns the reason
//! it stopped, or `None` when the connection was already being torn down.

use crate::config::HubConfig;
use crate::connection::{Connection, DisconnectReason, OutboundReceiver};
use crate::dispatcher::Job;
use crate::metrics;
use agora_protocol::{codec, ProtocolError};
use agora_transport::{FrameReader, FrameWriter, Incoming, TransportError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

pub(crate) async fn inbound<R: FrameReader>(
    mut reader: R,
    connection: Arc<Connection>,
    intake: mpsc::Sender<Job>,
    config: Arc<HubConfig>,
) -> Option<DisconnectReason> {
    let id = connection.id();
    let token = connection.shutdown_token().clone();

    loop {
        let read = tokio::select! {
            _ = token.cancelled() => return None,
            read = time::timeout(config.read_timeout, reader.recv()) => read,
        };

        let frame = match read {
            Err(_) => {
                debug!(connection = %id, idle = ?connection.idle_for(), "Read deadline expired");
                return Some(DisconnectReason::IdleTimeout);
            }
            Ok(Ok(None)) => {
                debug!(connection = %id, "Peer closed connection");
                return Some(DisconnectReason::PeerClosed);
            }
            Ok(Err(TransportError::FrameTooLarge { size, max })) => {
                warn!(connection = %id, size, max, "Inbound frame too large");
                return Some(DisconnectReason::FrameTooLarge);
            }
            Ok(Err(TransportError::Timeout)) => return Some(DisconnectReason::IdleTimeout),
            Ok(Err(e)) => {
                debug!(connection = %id, error = %e, "Read failed");
                return Some(DisconnectReason::ReadError);
            }
            Ok(Ok(Some(Incoming::Heartbeat))) => {
                connection.touch();
                continue;
            }
            Ok(Ok(Some(Incoming::Frame(frame)))) => frame,
        };

        connection.touch();

        let envelope = match codec::decode_bounded(&frame, config.max_frame_size) {
            Ok(envelope) => envelope,
            Err(ProtocolError::FrameTooLarge { size, max }) => {
                warn!(connection = %id, size, max, "Inbound frame too large");
                return Some(DisconnectReason::FrameTooLarge);
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "Failed to decode frame, skipping");
                metrics::record_decode_error("envelope");
                continue;
            }
        };
        trace!(connection = %id, kind = %envelope.kind(), "Received event");

        let job = Job::Inbound {
            origin: connection.clone(),
            envelope,
        };
        // A full intake slows this reader down instead of dropping the event.
        tokio::select! {
            _ = token.cancelled() => return None,
            sent = intake.send(job) => {
                if sent.is_err() {
                    // Dispatcher is gone; the hub is shutting down.
                    return None;
                }
            }
        }
    }
}

pub(crate) async fn outbound<W: FrameWriter>(
    mut writer: W,
    connection: Arc<Connection>,
    mut queue: OutboundReceiver,
    config: Arc<HubConfig>,
) -> Option<DisconnectReason> {
    let id = connection.id();
    let token = connection.shutdown_token().clone();
    let mut heartbeat = time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut batch = Vec::with_capacity(config.max_batch);

    let reason = loop {
        tokio::select! {
            // Pings are not starved by a busy queue, and queued frames go out
            // before a pending close is honoured.
            biased;

            _ = heartbeat.tick() => {
                trace!(connection = %id, "Sending heartbeat");
                if let Err(reason) = deadline(config.write_timeout, writer.ping()).await {
                    warn!(connection = %id, reason = %reason, "Heartbeat failed");
                    break Some(reason);
                }
            }

            frame = queue.recv() => {
                let Some(frame) = frame else {
                    // Closed by unregistration.
                    break None;
                };
                batch.push(frame);
                while batch.len() < config.max_batch {
                    match queue.try_recv() {
                        Ok(frame) => batch.push(frame),
                        Err(_) => break,
                    }
                }
                let payload = codec::coalesce(&batch);
                let count = batch.len();
                batch.clear();

                trace!(connection = %id, messages = count, bytes = payload.len(), "Writing");
                if let Err(reason) = deadline(config.write_timeout, writer.send(payload)).await {
                    warn!(connection = %id, reason = %reason, "Write failed");
                    break Some(reason);
                }
            }

            _ = token.cancelled() => break None,
        }
    };

    let _ = time::timeout(config.write_timeout, writer.close()).await;
    reason
}

async fn deadline<F>(limit: Duration, write: F) -> Result<(), DisconnectReason>
where
    F: Future<Output = Result<(), TransportError>>,
{
    match time::timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(DisconnectReason::WriteError),
        Err(_) => Err(DisconnectReason::WriteTimeout),
    }
}
