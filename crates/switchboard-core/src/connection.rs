//! Connection identity, outbox, and lifecycle.
//!
//! A registered connection is represented inside the registry by a
//! [`ConnectionHandle`]: its id, the sending half of its bounded outbox, its
//! lifecycle state, and the peer alias once bound. The receiving half of the
//! outbox lives with the session task that owns the socket, so every byte
//! written to a connection goes through exactly one writer.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique identifier for a registered connection.
///
/// Allocated from a process-wide counter; never reused while the process
/// lives, so a stale id can only ever miss, not alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw numeric id.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{:x}", self.0)
    }
}

/// A client-chosen peer alias, bound to a connection after registration.
pub type PeerId = String;

/// Connection lifecycle states, in order. Transitions are monotonic: a
/// connection never moves backwards, and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnState {
    Connecting = 0,
    Registered = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl ConnState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ConnState::Connecting,
            1 => ConnState::Registered,
            2 => ConnState::Active,
            3 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

/// Atomic lifecycle cell shared between the registry and the session task.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    /// Create a new lifecycle in `Connecting`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnState::Connecting as u8),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnState {
        ConnState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Advance to `to`, if the current state precedes it.
    ///
    /// Returns `true` only for the call that performed the transition, which
    /// makes "first caller wins" cleanup decisions a single call.
    pub fn advance(&self, to: ConnState) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current >= to as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Enter `Closing`. Returns `true` for the first caller only.
    pub fn begin_close(&self) -> bool {
        self.advance(ConnState::Closing)
    }

    /// Whether the connection can still receive deliveries.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() < ConnState::Closing
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// The sending half of a connection's bounded outbox.
///
/// Carries pre-encoded frames. Enqueueing never awaits: a full queue means
/// the connection is not draining and is treated as failed by the caller.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Bytes>,
}

impl Outbox {
    /// Create an outbox pair with the given capacity.
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a pre-encoded frame without blocking.
    ///
    /// Returns `false` if the queue is full or the receiving session is gone.
    pub fn enqueue(&self, frame: Bytes) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Registry-owned record of one live connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbox: Outbox,
    lifecycle: Arc<Lifecycle>,
    peer: Option<PeerId>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, outbox: Outbox, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            id,
            outbox,
            lifecycle,
            peer: None,
        }
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Clone of the outbox sender.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Shared lifecycle cell.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Bound peer alias, if any.
    #[must_use]
    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    /// Replace the peer alias, returning the previous one.
    pub(crate) fn set_peer(&mut self, peer: PeerId) -> Option<PeerId> {
        self.peer.replace(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::from_raw(1).to_string(), "conn_1");
        assert_eq!(ConnectionId::from_raw(0x2a).to_string(), "conn_2a");
    }

    #[test]
    fn test_lifecycle_monotonic() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), ConnState::Connecting);

        assert!(lc.advance(ConnState::Registered));
        assert!(lc.advance(ConnState::Active));
        assert!(lc.is_live());

        // No going back.
        assert!(!lc.advance(ConnState::Registered));
        assert_eq!(lc.state(), ConnState::Active);

        assert!(lc.begin_close());
        assert!(!lc.is_live());
        assert!(lc.advance(ConnState::Closed));
        assert!(!lc.advance(ConnState::Closing));
        assert_eq!(lc.state(), ConnState::Closed);
    }

    #[test]
    fn test_begin_close_first_caller_wins() {
        let lc = Arc::new(Lifecycle::new());
        lc.advance(ConnState::Active);

        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let lc = Arc::clone(&lc);
                    s.spawn(move || usize::from(lc.begin_close()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(winners, 1);
        assert_eq!(lc.state(), ConnState::Closing);
    }

    #[tokio::test]
    async fn test_outbox_bounded() {
        let (outbox, mut rx) = Outbox::channel(1);

        assert!(outbox.enqueue(Bytes::from_static(b"first")));
        // Queue full: second enqueue fails without blocking.
        assert!(!outbox.enqueue(Bytes::from_static(b"second")));

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"first"));

        drop(rx);
        assert!(!outbox.enqueue(Bytes::from_static(b"third")));
    }
}
