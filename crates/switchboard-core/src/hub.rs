//! Broadcast fan-out.
//!
//! The hub encodes a broadcast once, snapshots the registry, and enqueues the
//! shared bytes to every live connection's outbox outside any registry lock.
//! A connection that cannot accept the frame is reported in the returned
//! [`Fanout`] and never stalls delivery to the rest; acting on the report
//! (disconnecting the failed connection) is the listener's job.

use crate::connection::ConnectionId;
use crate::registry::Registry;
use std::sync::Arc;
use switchboard_protocol::{codec, Frame, ProtocolError};
use tracing::{debug, trace};

/// Broadcast hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Deliver broadcasts back to their sender.
    pub echo_to_sender: bool,
}

/// Result of one fan-out sweep.
#[derive(Debug, Default)]
pub struct Fanout {
    /// Connections that accepted the frame.
    pub delivered: usize,
    /// Connections whose outbox was full or gone. Each should be treated as
    /// a failed write and unregistered by the caller.
    pub failed: Vec<ConnectionId>,
}

/// Fans payloads out to every live connection.
pub struct BroadcastHub {
    registry: Arc<Registry>,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub over the given registry with default configuration.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(registry: Arc<Registry>, config: HubConfig) -> Self {
        Self { registry, config }
    }

    /// Deliver `payload` to every live connection except (by default) the
    /// sender, in registry iteration order at the time of the call.
    ///
    /// Messages published by one sender arrive in publish order because each
    /// sender publishes from its own read loop and outboxes are FIFO; no
    /// ordering holds across senders.
    ///
    /// # Errors
    ///
    /// Returns an error only if the payload cannot be encoded (oversized).
    /// Per-connection failures are reported in the `Fanout`, not as errors.
    pub fn publish(
        &self,
        sender: ConnectionId,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Fanout, ProtocolError> {
        let wire = codec::encode(&Frame::broadcast(payload))?;

        let mut fanout = Fanout::default();
        for (id, outbox) in self.registry.snapshot() {
            if id == sender && !self.config.echo_to_sender {
                continue;
            }
            if outbox.enqueue(wire.clone()) {
                fanout.delivered += 1;
            } else {
                debug!(connection = %id, "Broadcast enqueue failed");
                fanout.failed.push(id);
            }
        }

        trace!(
            sender = %sender,
            delivered = fanout.delivered,
            failed = fanout.failed.len(),
            "Broadcast"
        );
        Ok(fanout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registration, RegistryConfig};
    use switchboard_protocol::codec::decode;

    fn decode_broadcast(wire: bytes::Bytes) -> Vec<u8> {
        match decode(&wire).unwrap() {
            Frame::Broadcast { payload, .. } => payload,
            other => panic!("expected broadcast, got {:?}", other),
        }
    }

    fn setup(n: usize) -> (Arc<Registry>, Vec<Registration>) {
        let registry = Arc::new(Registry::new());
        let regs = (0..n).map(|_| registry.register().unwrap()).collect();
        (registry, regs)
    }

    #[tokio::test]
    async fn test_publish_excludes_sender() {
        let (registry, mut regs) = setup(3);
        let hub = BroadcastHub::new(Arc::clone(&registry));

        let fanout = hub.publish(regs[0].id, b"hi".to_vec()).unwrap();
        assert_eq!(fanout.delivered, 2);
        assert!(fanout.failed.is_empty());

        for reg in regs.iter_mut().skip(1) {
            let wire = reg.outbox_rx.recv().await.unwrap();
            assert_eq!(decode_broadcast(wire), b"hi");
        }
        // Sender got nothing.
        assert!(regs[0].outbox_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_echo_to_sender() {
        let (registry, mut regs) = setup(2);
        let hub = BroadcastHub::with_config(
            Arc::clone(&registry),
            HubConfig {
                echo_to_sender: true,
            },
        );

        let fanout = hub.publish(regs[0].id, b"all".to_vec()).unwrap();
        assert_eq!(fanout.delivered, 2);
        assert_eq!(
            decode_broadcast(regs[0].outbox_rx.recv().await.unwrap()),
            b"all"
        );
    }

    #[tokio::test]
    async fn test_single_sender_ordering() {
        let (registry, mut regs) = setup(2);
        let hub = BroadcastHub::new(Arc::clone(&registry));

        for payload in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
            hub.publish(regs[0].id, payload).unwrap();
        }

        let receiver = &mut regs[1].outbox_rx;
        assert_eq!(decode_broadcast(receiver.recv().await.unwrap()), b"one");
        assert_eq!(decode_broadcast(receiver.recv().await.unwrap()), b"two");
        assert_eq!(decode_broadcast(receiver.recv().await.unwrap()), b"three");
    }

    #[tokio::test]
    async fn test_failed_connection_isolated() {
        let registry = Arc::new(Registry::with_config(RegistryConfig {
            outbox_capacity: 1,
            ..Default::default()
        }));
        let sender = registry.register().unwrap();
        let mut healthy = registry.register().unwrap();
        let stuck = registry.register().unwrap();

        let hub = BroadcastHub::new(Arc::clone(&registry));

        // Fill the stuck connection's outbox so the next enqueue fails.
        registry
            .outbox(stuck.id)
            .unwrap()
            .enqueue(bytes::Bytes::from_static(b"wedged"));

        let fanout = hub.publish(sender.id, b"payload".to_vec()).unwrap();
        assert_eq!(fanout.delivered, 1);
        assert_eq!(fanout.failed, vec![stuck.id]);

        // The healthy connection still received the broadcast.
        assert_eq!(
            decode_broadcast(healthy.outbox_rx.recv().await.unwrap()),
            b"payload"
        );
    }

    #[tokio::test]
    async fn test_dropped_session_reported_failed() {
        let (registry, mut regs) = setup(2);
        let hub = BroadcastHub::new(Arc::clone(&registry));

        let alive = regs.remove(0);
        let dead = regs.remove(0);
        let gone = dead.id;
        // Simulate a session that died without unregistering yet.
        drop(dead);

        let fanout = hub.publish(alive.id, b"x".to_vec()).unwrap();
        assert_eq!(fanout.delivered, 0);
        assert_eq!(fanout.failed, vec![gone]);
    }
}
