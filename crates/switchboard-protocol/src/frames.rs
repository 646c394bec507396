//! Frame types for the Switchboard relay protocol.
//!
//! A frame is the unit of exchange between a client and the relay. Frames are
//! serialized with MessagePack; payloads inside them are opaque to the relay.

use serde::{Deserialize, Serialize};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Connect = 0x01,
    Connected = 0x02,
    Broadcast = 0x03,
    Signal = 0x04,
    Bind = 0x05,
    Ack = 0x06,
    Error = 0x07,
    Ping = 0x08,
    Pong = 0x09,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Connect),
            0x02 => Ok(FrameType::Connected),
            0x03 => Ok(FrameType::Broadcast),
            0x04 => Ok(FrameType::Signal),
            0x05 => Ok(FrameType::Bind),
            0x06 => Ok(FrameType::Ack),
            0x07 => Ok(FrameType::Error),
            0x08 => Ok(FrameType::Ping),
            0x09 => Ok(FrameType::Pong),
            _ => Err("Invalid frame type"),
        }
    }
}

/// Wire error codes carried in [`Frame::Error`].
pub mod codes {
    /// Frame could not be decoded.
    pub const MALFORMED_FRAME: u16 = 1001;
    /// Another live connection already holds the requested peer id.
    pub const DUPLICATE_PEER_ID: u16 = 1002;
    /// Signal target is not bound to any live connection.
    pub const PEER_UNREACHABLE: u16 = 1003;
    /// Relay is at its connection limit.
    pub const CAPACITY_EXCEEDED: u16 = 1004;
    /// Payload exceeds the configured maximum.
    pub const PAYLOAD_TOO_LARGE: u16 = 1005;
    /// Operation referenced a connection that is no longer registered.
    pub const UNKNOWN_CONNECTION: u16 = 1006;
}

/// A protocol frame.
///
/// `Broadcast` and `Signal` are the two routable kinds; everything else is
/// handshake or control traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Initial client handshake.
    #[serde(rename = "connect")]
    Connect {
        /// Protocol version the client speaks.
        version: u8,
        /// Opaque authorization token, checked by the embedding layer.
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Server response completing the handshake.
    #[serde(rename = "connected")]
    Connected {
        /// Connection id assigned by the registry.
        connection_id: String,
        /// Negotiated protocol version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Fan a payload out to every other live connection.
    #[serde(rename = "broadcast")]
    Broadcast {
        /// Optional request ID for acknowledgment.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Opaque payload.
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },

    /// Deliver a payload to exactly one peer, addressed by peer id.
    #[serde(rename = "signal")]
    Signal {
        /// Optional request ID for acknowledgment.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Originating identity. Stamped by the server on delivery; any
        /// client-supplied value is ignored.
        #[serde(skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        /// Target peer id.
        target: String,
        /// Opaque payload (offer/answer/candidate framing, not interpreted).
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },

    /// Claim a peer id for this connection.
    #[serde(rename = "bind")]
    Bind {
        /// Request ID for acknowledgment.
        id: u64,
        /// Peer id to claim.
        peer_id: String,
    },

    /// Acknowledgment of a request.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code (see [`codes`]).
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Connect { .. } => FrameType::Connect,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Broadcast { .. } => FrameType::Broadcast,
            Frame::Signal { .. } => FrameType::Signal,
            Frame::Bind { .. } => FrameType::Bind,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
        }
    }

    /// Create a new Broadcast frame.
    #[must_use]
    pub fn broadcast(payload: impl Into<Vec<u8>>) -> Self {
        Frame::Broadcast {
            id: None,
            payload: payload.into(),
        }
    }

    /// Create a new Signal frame addressed to a peer.
    #[must_use]
    pub fn signal(target: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Frame::Signal {
            id: None,
            sender: None,
            target: target.into(),
            payload: payload.into(),
        }
    }

    /// Create a Signal frame stamped with the sender identity, as delivered
    /// to the target.
    #[must_use]
    pub fn signal_from(
        sender: impl Into<String>,
        target: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Frame::Signal {
            id: None,
            sender: Some(sender.into()),
            target: target.into(),
            payload: payload.into(),
        }
    }

    /// Create a new Bind frame.
    #[must_use]
    pub fn bind(id: u64, peer_id: impl Into<String>) -> Self {
        Frame::Bind {
            id,
            peer_id: peer_id.into(),
        }
    }

    /// Create a new Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connect frame.
    #[must_use]
    pub fn connect(version: u8, token: Option<String>) -> Self {
        Frame::Connect { version, token }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type() {
        let broadcast = Frame::broadcast(b"hello".to_vec());
        assert_eq!(broadcast.frame_type(), FrameType::Broadcast);

        let signal = Frame::signal("peer-1", b"offer".to_vec());
        assert_eq!(signal.frame_type(), FrameType::Signal);

        let bind = Frame::bind(1, "peer-1");
        assert_eq!(bind.frame_type(), FrameType::Bind);
    }

    #[test]
    fn test_frame_type_conversion() {
        for raw in 0x01..=0x09u8 {
            let ft = FrameType::try_from(raw).unwrap();
            assert_eq!(u8::from(ft), raw);
        }
        assert!(FrameType::try_from(0x0A).is_err());
        assert!(FrameType::try_from(0).is_err());
    }

    #[test]
    fn test_signal_sender_stamping() {
        let inbound = Frame::signal("p1", b"offer".to_vec());
        match &inbound {
            Frame::Signal { sender, .. } => assert!(sender.is_none()),
            _ => unreachable!(),
        }

        let delivered = Frame::signal_from("conn_2a", "p1", b"offer".to_vec());
        match &delivered {
            Frame::Signal { sender, target, .. } => {
                assert_eq!(sender.as_deref(), Some("conn_2a"));
                assert_eq!(target, "p1");
            }
            _ => unreachable!(),
        }
    }
}
