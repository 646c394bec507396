//! The connection registry.
//!
//! The registry is the single authority on connection existence: every live
//! connection is an entry here, and routing components look connections up
//! per delivery instead of caching them. Mutations go through the sharded
//! maps (serialized per shard); lookups run concurrently.
//!
//! Lock order is `entries` before `peers`; no method holds a `peers` guard
//! while touching `entries`.

use crate::connection::{ConnState, ConnectionHandle, ConnectionId, Lifecycle, Outbox, PeerId};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum peer alias length.
pub const MAX_PEER_ID_LENGTH: usize = 128;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry is at its connection limit.
    #[error("Registry at capacity ({0} connections)")]
    CapacityExceeded(usize),

    /// Operation referenced an id that is not registered.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Another live connection already holds the alias.
    #[error("Peer id already bound: {0}")]
    DuplicatePeerId(PeerId),

    /// Peer alias failed validation.
    #[error("Invalid peer id: {0}")]
    InvalidPeerId(&'static str),

    /// Registry is sealed for shutdown.
    #[error("Registry is shutting down")]
    ShuttingDown,
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of live connections.
    pub max_connections: usize,
    /// Capacity of each connection's outbox.
    pub outbox_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections: 100_000,
            outbox_capacity: 256,
        }
    }
}

/// Validate a peer alias.
///
/// # Errors
///
/// Returns an error message if the alias is invalid.
pub fn validate_peer_id(peer_id: &str) -> Result<(), &'static str> {
    if peer_id.is_empty() {
        return Err("Peer id cannot be empty");
    }
    if peer_id.len() > MAX_PEER_ID_LENGTH {
        return Err("Peer id too long");
    }
    if !peer_id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Peer id contains invalid characters");
    }
    Ok(())
}

/// Everything a session needs after registering: its id, the receiving half
/// of its outbox, and the shared lifecycle cell.
#[derive(Debug)]
pub struct Registration {
    /// Assigned connection id.
    pub id: ConnectionId,
    /// Receiving half of the outbox; the session's writer drains this.
    pub outbox_rx: tokio::sync::mpsc::Receiver<Bytes>,
    /// Lifecycle cell shared with the registry.
    pub lifecycle: Arc<Lifecycle>,
}

/// The authoritative map of live connections and bound peer aliases.
pub struct Registry {
    /// Live connections by id.
    entries: DashMap<ConnectionId, ConnectionHandle>,
    /// Peer alias index (alias -> owning connection id).
    peers: DashMap<PeerId, ConnectionId>,
    /// Id allocator. Ids are never reused.
    next_id: AtomicU64,
    /// Set once shutdown starts; rejects further registrations.
    sealed: AtomicBool,
    config: RegistryConfig,
}

impl Registry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            entries: DashMap::new(),
            peers: DashMap::new(),
            next_id: AtomicU64::new(1),
            sealed: AtomicBool::new(false),
            config,
        }
    }

    /// Register a new connection.
    ///
    /// Allocates a fresh id, creates the bounded outbox, and stores the
    /// handle. The returned [`Registration`] carries the receiving half of
    /// the outbox for the session's writer.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` at the connection limit, `ShuttingDown` once the
    /// registry has been sealed.
    pub fn register(&self) -> Result<Registration, RegistryError> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }
        if self.entries.len() >= self.config.max_connections {
            warn!(limit = self.config.max_connections, "Registry at capacity");
            return Err(RegistryError::CapacityExceeded(self.config.max_connections));
        }

        let id = ConnectionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbox, outbox_rx) = Outbox::channel(self.config.outbox_capacity);
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.advance(ConnState::Registered);

        self.entries
            .insert(id, ConnectionHandle::new(id, outbox, Arc::clone(&lifecycle)));

        debug!(connection = %id, total = self.entries.len(), "Connection registered");

        Ok(Registration {
            id,
            outbox_rx,
            lifecycle,
        })
    }

    /// Remove a connection. Idempotent: the first caller removes the entry
    /// and any peer binding; later callers get `false` and no side effects.
    ///
    /// Dropping the entry releases the outbox sender, which wakes the owning
    /// session and terminates its writer.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let Some((_, handle)) = self.entries.remove(&id) else {
            return false;
        };

        handle.lifecycle().begin_close();

        if let Some(peer) = handle.peer() {
            self.peers.remove_if(peer, |_, owner| *owner == id);
        }

        handle.lifecycle().advance(ConnState::Closed);
        debug!(connection = %id, remaining = self.entries.len(), "Connection unregistered");
        true
    }

    /// Bind a peer alias to a connection.
    ///
    /// Exclusive: when two connections race for the same alias, the peer
    /// index entry decides atomically and exactly one wins. Re-binding the
    /// alias a connection already holds is a no-op; binding a different alias
    /// releases the previous one.
    ///
    /// # Errors
    ///
    /// `UnknownConnection` if `id` is not registered, `DuplicatePeerId` if
    /// another live connection holds the alias, `InvalidPeerId` on
    /// validation failure.
    pub fn bind_peer(&self, id: ConnectionId, peer_id: &str) -> Result<(), RegistryError> {
        validate_peer_id(peer_id).map_err(RegistryError::InvalidPeerId)?;

        let Some(mut handle) = self.entries.get_mut(&id) else {
            return Err(RegistryError::UnknownConnection(id));
        };

        match self.peers.entry(peer_id.to_string()) {
            Entry::Occupied(occupied) => {
                if *occupied.get() == id {
                    return Ok(());
                }
                warn!(connection = %id, peer = %peer_id, "Peer id already bound");
                Err(RegistryError::DuplicatePeerId(peer_id.to_string()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
                if let Some(previous) = handle.set_peer(peer_id.to_string()) {
                    self.peers.remove_if(&previous, |_, owner| *owner == id);
                }
                debug!(connection = %id, peer = %peer_id, "Peer id bound");
                Ok(())
            }
        }
    }

    /// Resolve a peer alias to its connection id.
    #[must_use]
    pub fn lookup(&self, peer_id: &str) -> Option<ConnectionId> {
        self.peers.get(peer_id).map(|owner| *owner)
    }

    /// Get the outbox for a connection id.
    #[must_use]
    pub fn outbox(&self, id: ConnectionId) -> Option<Outbox> {
        self.entries.get(&id).map(|handle| handle.outbox())
    }

    /// Get the peer alias bound to a connection, if any.
    #[must_use]
    pub fn peer_alias(&self, id: ConnectionId) -> Option<PeerId> {
        self.entries.get(&id).and_then(|handle| handle.peer().cloned())
    }

    /// Whether a connection id is currently registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consistent snapshot of every live connection's delivery handle, in
    /// registry iteration order. Fan-out happens against this snapshot,
    /// outside any registry lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ConnectionId, Outbox)> {
        self.entries
            .iter()
            .map(|entry| (entry.id(), entry.outbox()))
            .collect()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            connections: self.entries.len(),
            bound_peers: self.peers.len(),
        }
    }

    /// Stop accepting registrations. Existing connections are unaffected.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        info!("Registry sealed");
    }

    /// Unregister every live connection. Returns how many were removed.
    pub fn drain(&self) -> usize {
        let ids: Vec<ConnectionId> = self.entries.iter().map(|entry| entry.id()).collect();
        let mut removed = 0;
        for id in ids {
            if self.unregister(id) {
                removed += 1;
            }
        }
        info!(removed, "Registry drained");
        removed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of live connections.
    pub connections: usize,
    /// Number of bound peer aliases.
    pub bound_peers: usize,
}
