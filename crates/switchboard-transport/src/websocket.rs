//! WebSocket transport built on tokio-tungstenite.
//!
//! [`WebSocketListener`] accepts and upgrades raw TCP connections;
//! [`WebSocketLink`] carries length-prefixed frames over the socket in binary
//! messages. [`WebSocketLink::connect`] provides the client side, used by
//! integration tests and tooling.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use switchboard_protocol::{codec, Frame};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async, connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::traits::{Link, Listener, TransportError};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 9400).into(),
            max_message_size: 64 * 1024,
        }
    }
}

/// Standalone WebSocket listener over TCP.
pub struct WebSocketListener {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketListener {
    /// Bind a listener with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn new(config: WebSocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        debug!("WebSocket listener bound on {}", config.bind_addr);
        Ok(Self { listener, config })
    }

    /// Bind a listener on `addr` with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(WebSocketConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }

    /// The bound local address (useful when binding port 0).
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

#[async_trait]
impl Listener for WebSocketListener {
    async fn accept(&self) -> Result<Box<dyn Link>, TransportError> {
        let (stream, addr) = self.listener.accept().await?;

        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        debug!("WebSocket handshake completed with {}", addr);

        Ok(Box::new(WebSocketLink::new(
            ws_stream,
            Some(addr),
            self.config.max_message_size,
        )))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A framed connection over a WebSocket stream.
pub struct WebSocketLink<S> {
    stream: WebSocketStream<S>,
    remote_addr: Option<SocketAddr>,
    open: bool,
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl<S> WebSocketLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn new(stream: WebSocketStream<S>, remote_addr: Option<SocketAddr>, max_message_size: usize) -> Self {
        Self {
            stream,
            remote_addr,
            open: true,
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }
}

/// Client-side link type returned by [`WebSocketLink::connect`].
pub type ClientLink = WebSocketLink<MaybeTlsStream<TcpStream>>;

impl WebSocketLink<MaybeTlsStream<TcpStream>> {
    /// Connect to a relay as a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        Ok(Self::new(
            stream,
            None,
            WebSocketConfig::default().max_message_size,
        ))
    }
}

#[async_trait]
impl<S> Link for WebSocketLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            // Drain the buffer before touching the socket.
            if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                return Ok(Some(frame));
            }

            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > self.max_message_size {
                        warn!(
                            "Message too large: {} bytes (max: {})",
                            data.len(),
                            self.max_message_size
                        );
                        return Err(TransportError::Protocol(
                            switchboard_protocol::codec::ProtocolError::FrameTooLarge(data.len()),
                        ));
                    }
                    self.read_buffer.extend_from_slice(&data);
                }
                Some(Ok(Message::Text(text))) => {
                    // Compatibility: feed text to the same decoder.
                    self.read_buffer.extend_from_slice(text.as_bytes());
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(WsError::ConnectionClosed)) | None => {
                    self.open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let data = codec::encode(&frame)?;
        self.send_raw(data).await
    }

    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }

        self.stream
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        self.stream
            .close(None)
            .await
            .or_else(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => Ok(()),
                other => Err(TransportError::SendFailed(other.to_string())),
            })
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.bind_addr.port(), 9400);
        assert_eq!(config.max_message_size, 64 * 1024);
    }

    #[tokio::test]
    async fn test_loopback_frame_exchange() {
        let listener = WebSocketListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut link = listener.accept().await.unwrap();
            let frame = link.recv().await.unwrap().unwrap();
            assert_eq!(frame, Frame::bind(7, "peer-a"));

            link.send(Frame::ack(7)).await.unwrap();

            // Client closes; recv observes the clean end.
            assert!(link.recv().await.unwrap().is_none());
            assert!(!link.is_open());
        });

        let mut client = WebSocketLink::connect(&format!("ws://{}", addr))
            .await
            .unwrap();
        client.send(Frame::bind(7, "peer-a")).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(Frame::ack(7)));

        client.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let listener = WebSocketListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut link = listener.accept().await.unwrap();
            let _ = link.recv().await;
        });

        let mut client = WebSocketLink::connect(&format!("ws://{}", addr))
            .await
            .unwrap();
        client.close().await.unwrap();
        assert!(matches!(
            client.send(Frame::ping()).await,
            Err(TransportError::Closed)
        ));

        server.await.unwrap();
    }
}
