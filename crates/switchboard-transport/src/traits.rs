//! Transport abstraction traits for Switchboard.
//!
//! A [`Listener`] accepts framed connections; a [`Link`] is one such
//! connection. Links carry frames, not identity: connection ids are issued by
//! the registry at registration time, after the transport hands the link
//! over.

use async_trait::async_trait;
use bytes::Bytes;
use switchboard_protocol::Frame;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Link was closed.
    #[error("Connection closed")]
    Closed,

    /// Operation timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol upgrade handshake failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Wire protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] switchboard_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepts new framed connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Accept the next connection, completing any protocol upgrade.
    ///
    /// Blocks until a connection is available or an error occurs.
    async fn accept(&self) -> Result<Box<dyn Link>, TransportError>;

    /// Transport name (e.g. "websocket").
    fn name(&self) -> &'static str;
}

/// A bidirectional framed connection.
#[async_trait]
pub trait Link: Send {
    /// Receive the next frame.
    ///
    /// Returns `None` on clean close.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Send a frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send pre-encoded frame bytes, avoiding re-encoding on fan-out paths.
    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError>;

    /// Close the link gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Remote address, if known.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Whether the link is still open.
    fn is_open(&self) -> bool;
}
