//! The connection registry.
//!
//! Two indices describe who is connected: connection ID → connection and
//! user ID → that user's connections. Both live behind one lock so no
//! reader ever sees one updated without the other. Mutation is reserved to
//! the lifecycle controller.

use crate::connection::{Connection, ConnectionId};
use agora_protocol::UserId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Indices {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    /// Never holds an empty inner map.
    users: HashMap<UserId, HashMap<ConnectionId, Arc<Connection>>>,
}

/// Outcome of [`Registry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insertion {
    /// Added. `first_for_user` is set when the user had no other connection.
    Added { first_for_user: bool },
    /// The connection was already registered.
    Duplicate,
}

/// Outcome of [`Registry::remove`].
#[derive(Debug)]
pub(crate) struct Removal {
    pub connection: Arc<Connection>,
    /// The user has no connection left.
    pub last_for_user: bool,
}

/// Authoritative in-memory index of live connections.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Indices>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, connection: Arc<Connection>) -> Insertion {
        let id = connection.id();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.connections.contains_key(&id) {
            return Insertion::Duplicate;
        }

        let mut first_for_user = false;
        if let Some(user) = connection.user() {
            let conns = inner.users.entry(user).or_default();
            first_for_user = conns.is_empty();
            conns.insert(id, connection.clone());
        }
        inner.connections.insert(id, connection);

        Insertion::Added { first_for_user }
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Removal> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let connection = inner.connections.remove(&id)?;

        let mut last_for_user = false;
        if let Some(user) = connection.user() {
            if let Some(conns) = inner.users.get_mut(&user) {
                conns.remove(&id);
                if conns.is_empty() {
                    inner.users.remove(&user);
                    last_for_user = true;
                }
            }
        }

        Some(Removal {
            connection,
            last_for_user,
        })
    }

    /// Look up a connection by ID.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.read().connections.get(&id).cloned()
    }

    /// Check whether a connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().connections.contains_key(&id)
    }

    /// All live connections of a user.
    #[must_use]
    pub fn user_connections(&self, user: UserId) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .users
            .get(&user)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every live connection except `exclude`.
    #[must_use]
    pub fn connections_except(&self, exclude: Option<ConnectionId>) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .connections
            .values()
            .filter(|conn| Some(conn.id()) != exclude)
            .cloned()
            .collect()
    }

    /// IDs of every live connection.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.read().connections.keys().copied().collect()
    }

    /// Whether the user has at least one live connection.
    #[must_use]
    pub fn is_online(&self, user: UserId) -> bool {
        self.inner.read().users.contains_key(&user)
    }

    /// Snapshot of online users.
    #[must_use]
    pub fn online_user_ids(&self) -> HashSet<UserId> {
        self.inner.read().users.keys().copied().collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of online users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.inner.read().users.len()
    }

    /// Verify that both indices describe the same set of connections.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let inner = self.inner.read();

        let forward = inner.connections.values().all(|conn| match conn.user() {
            Some(user) => inner
                .users
                .get(&user)
                .is_some_and(|conns| conns.contains_key(&conn.id())),
            None => true,
        });

        let backward = inner.users.iter().all(|(user, conns)| {
            !conns.is_empty()
                && conns.iter().all(|(id, conn)| {
                    conn.user() == Some(*user) && inner.connections.contains_key(id)
                })
        });

        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(user: Option<u64>) -> Arc<Connection> {
        Connection::new(user.map(UserId), 8).0
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = Registry::new();
        let a = conn(Some(1));

        assert_eq!(
            registry.insert(a.clone()),
            Insertion::Added {
                first_for_user: true
            }
        );
        assert!(registry.contains(a.id()));
        assert!(registry.is_online(UserId(1)));
        assert_eq!(registry.insert(a.clone()), Insertion::Duplicate);

        let removal = registry.remove(a.id()).unwrap();
        assert!(removal.last_for_user);
        assert!(!registry.is_online(UserId(1)));
        assert!(registry.remove(a.id()).is_none());
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_multiple_connections_per_user() {
        let registry = Registry::new();
        let a1 = conn(Some(1));
        let a2 = conn(Some(1));

        assert_eq!(
            registry.insert(a1.clone()),
            Insertion::Added {
                first_for_user: true
            }
        );
        assert_eq!(
            registry.insert(a2.clone()),
            Insertion::Added {
                first_for_user: false
            }
        );
        assert_eq!(registry.user_connections(UserId(1)).len(), 2);
        assert_eq!(registry.user_count(), 1);

        assert!(!registry.remove(a1.id()).unwrap().last_for_user);
        assert!(registry.is_online(UserId(1)));
        assert!(registry.remove(a2.id()).unwrap().last_for_user);
        assert!(!registry.is_online(UserId(1)));
    }

    #[test]
    fn test_anonymous_connection() {
        let registry = Registry::new();
        let anon = conn(None);

        assert_eq!(
            registry.insert(anon.clone()),
            Insertion::Added {
                first_for_user: false
            }
        );
        assert_eq!(registry.connection_count(), 1);
        assert!(registry.online_user_ids().is_empty());
        assert!(!registry.remove(anon.id()).unwrap().last_for_user);
    }

    #[test]
    fn test_connections_except() {
        let registry = Registry::new();
        let conns: Vec<_> = (1..=3).map(|u| conn(Some(u))).collect();
        for c in &conns {
            registry.insert(c.clone());
        }

        assert_eq!(registry.connections_except(None).len(), 3);
        let others = registry.connections_except(Some(conns[0].id()));
        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|c| c.id() != conns[0].id()));
    }

    #[test]
    fn test_indices_stay_consistent() {
        let registry = Registry::new();
        let conns: Vec<_> = (0..12).map(|i| conn(if i % 4 == 0 { None } else { Some(i % 3) })).collect();

        // Interleave inserts and removes, including repeats.
        for (step, c) in conns.iter().enumerate() {
            registry.insert(c.clone());
            if step % 2 == 1 {
                registry.remove(conns[step - 1].id());
                registry.remove(conns[step - 1].id());
            }
            assert!(registry.is_consistent());
        }

        for c in &conns {
            registry.remove(c.id());
            assert!(registry.is_consistent());
        }
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.user_count(), 0);
    }
}
