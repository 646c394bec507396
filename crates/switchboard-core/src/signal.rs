//! Directed peer signaling.
//!
//! The relay is a pure addressed pass-through: it resolves a peer alias,
//! stamps the frame with the sender's identity, and enqueues it to that one
//! connection. Offer/answer/candidate framing inside the payload is opaque
//! here, which keeps the relay decoupled from any particular negotiation
//! protocol.

use crate::connection::{ConnectionId, PeerId};
use crate::registry::Registry;
use std::sync::Arc;
use switchboard_protocol::{codec, Frame, ProtocolError};
use thiserror::Error;
use tracing::{debug, trace};

/// Signaling errors. All are reported to the sender only, never broadcast.
#[derive(Debug, Error)]
pub enum SignalError {
    /// No live connection holds the target alias. Retry or renegotiation is
    /// the sender's responsibility.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(PeerId),

    /// The target exists but its outbox would not accept the frame. The
    /// caller should unregister the named connection.
    #[error("Delivery to {0} failed")]
    DeliveryFailed(ConnectionId),

    /// Payload could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Forwards signaling frames to a single addressed peer.
pub struct SignalRelay {
    registry: Arc<Registry>,
}

impl SignalRelay {
    /// Create a relay over the given registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver `payload` to the connection bound to `target`, tagged with
    /// `sender` so the recipient knows provenance.
    ///
    /// Frames aimed at the same target arrive in the order the relay
    /// accepted them; nothing is implied across targets. Returns the target
    /// connection id on success.
    ///
    /// # Errors
    ///
    /// `PeerUnreachable` when the alias is unbound (nothing is delivered
    /// anywhere), `DeliveryFailed` when the target's outbox is full or gone.
    pub fn relay(
        &self,
        sender: &str,
        target: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<ConnectionId, SignalError> {
        let Some(conn_id) = self.registry.lookup(target) else {
            debug!(sender = %sender, target = %target, "Signal target unbound");
            return Err(SignalError::PeerUnreachable(target.to_string()));
        };

        // The alias index can be a step ahead of entry removal; a missing
        // entry is the same outcome as an unbound alias.
        let Some(outbox) = self.registry.outbox(conn_id) else {
            return Err(SignalError::PeerUnreachable(target.to_string()));
        };

        let wire = codec::encode(&Frame::signal_from(sender, target, payload))?;
        if outbox.enqueue(wire) {
            trace!(sender = %sender, target = %target, connection = %conn_id, "Signal relayed");
            Ok(conn_id)
        } else {
            debug!(connection = %conn_id, "Signal enqueue failed");
            Err(SignalError::DeliveryFailed(conn_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relay_delivers_to_target_only() {
        let registry = Arc::new(Registry::new());
        let mut target = registry.register().unwrap();
        let mut bystander = registry.register().unwrap();
        registry.bind_peer(target.id, "callee").unwrap();

        let relay = SignalRelay::new(Arc::clone(&registry));
        let delivered_to = relay
            .relay("caller", "callee", b"{\"type\":\"offer\"}".to_vec())
            .unwrap();
        assert_eq!(delivered_to, target.id);

        let wire = target.outbox_rx.recv().await.unwrap();
        match codec::decode(&wire).unwrap() {
            Frame::Signal {
                sender,
                target,
                payload,
                ..
            } => {
                assert_eq!(sender.as_deref(), Some("caller"));
                assert_eq!(target, "callee");
                assert_eq!(payload, b"{\"type\":\"offer\"}");
            }
            other => panic!("expected signal, got {:?}", other),
        }

        // Exactly one frame, and nothing anywhere else.
        assert!(target.outbox_rx.try_recv().is_err());
        assert!(bystander.outbox_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_unreachable_delivers_nothing() {
        let registry = Arc::new(Registry::new());
        let mut other = registry.register().unwrap();

        let relay = SignalRelay::new(Arc::clone(&registry));
        match relay.relay("caller", "nope", b"x".to_vec()) {
            Err(SignalError::PeerUnreachable(peer)) => assert_eq!(peer, "nope"),
            other => panic!("expected PeerUnreachable, got {:?}", other),
        }

        assert!(other.outbox_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_unreachable_after_unregister() {
        let registry = Arc::new(Registry::new());
        let target = registry.register().unwrap();
        registry.bind_peer(target.id, "gone").unwrap();
        registry.unregister(target.id);

        let relay = SignalRelay::new(Arc::clone(&registry));
        assert!(matches!(
            relay.relay("caller", "gone", b"x".to_vec()),
            Err(SignalError::PeerUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_per_target_ordering() {
        let registry = Arc::new(Registry::new());
        let mut target = registry.register().unwrap();
        registry.bind_peer(target.id, "callee").unwrap();

        let relay = SignalRelay::new(Arc::clone(&registry));
        relay.relay("a", "callee", b"offer".to_vec()).unwrap();
        relay.relay("b", "callee", b"answer".to_vec()).unwrap();

        let first = codec::decode(&target.outbox_rx.recv().await.unwrap()).unwrap();
        let second = codec::decode(&target.outbox_rx.recv().await.unwrap()).unwrap();
        match (first, second) {
            (Frame::Signal { payload: p1, .. }, Frame::Signal { payload: p2, .. }) => {
                assert_eq!(p1, b"offer");
                assert_eq!(p2, b"answer");
            }
            other => panic!("expected signals, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_delivery_failed_on_dead_session() {
        let registry = Arc::new(Registry::new());
        let target = registry.register().unwrap();
        let target_id = target.id;
        registry.bind_peer(target_id, "wedged").unwrap();
        drop(target); // Session gone, entry still registered.

        let relay = SignalRelay::new(Arc::clone(&registry));
        match relay.relay("caller", "wedged", b"x".to_vec()) {
            Err(SignalError::DeliveryFailed(id)) => assert_eq!(id, target_id),
            other => panic!("expected DeliveryFailed, got {:?}", other),
        }
    }
}
