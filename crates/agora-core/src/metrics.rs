//! Hub instrumentation.
//!
//! Recorded through the `metrics` facade; the embedding binary decides
//! whether and where they are exported.

use crate::connection::DisconnectReason;
use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "agora_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "agora_connections_active";
    pub const USERS_ONLINE: &str = "agora_users_online";
    pub const DISCONNECTS_TOTAL: &str = "agora_disconnects_total";
    pub const MESSAGES_ROUTED: &str = "agora_messages_routed_total";
    pub const DELIVERIES_TOTAL: &str = "agora_deliveries_total";
    pub const DECODE_ERRORS_TOTAL: &str = "agora_decode_errors_total";
    pub const INTAKE_DROPS_TOTAL: &str = "agora_intake_drops_total";
    pub const PRESENCE_CHANGES_TOTAL: &str = "agora_presence_changes_total";
}

pub(crate) fn record_registered(connections: usize, users: usize) {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).set(connections as f64);
    gauge!(names::USERS_ONLINE).set(users as f64);
}

pub(crate) fn record_unregistered(reason: DisconnectReason, connections: usize, users: usize) {
    counter!(names::DISCONNECTS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).set(connections as f64);
    gauge!(names::USERS_ONLINE).set(users as f64);
}

pub(crate) fn record_routed(route: &'static str, recipients: usize) {
    counter!(names::MESSAGES_ROUTED, "route" => route).increment(1);
    counter!(names::DELIVERIES_TOTAL, "route" => route).increment(recipients as u64);
}

pub(crate) fn record_decode_error(stage: &'static str) {
    counter!(names::DECODE_ERRORS_TOTAL, "stage" => stage).increment(1);
}

pub(crate) fn record_intake_drop() {
    counter!(names::INTAKE_DROPS_TOTAL).increment(1);
}

pub(crate) fn record_presence(online: bool) {
    let status = if online { "online" } else { "offline" };
    counter!(names::PRESENCE_CHANGES_TOTAL, "status" => status).increment(1);
}
