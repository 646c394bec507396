//! # switchboard-transport
//!
//! Transport layer for the Switchboard realtime relay.
//!
//! The [`Listener`] and [`Link`] traits keep the rest of the system
//! transport-agnostic; [`WebSocketListener`] / [`WebSocketLink`] implement
//! them over tokio-tungstenite. The link type doubles as the client used by
//! integration tests.
//!
//! ```rust,ignore
//! use switchboard_transport::{Link, WebSocketLink};
//! use switchboard_protocol::Frame;
//!
//! let mut link = WebSocketLink::connect("ws://127.0.0.1:9400/relay").await?;
//! link.send(Frame::broadcast(b"hello".to_vec())).await?;
//! while let Some(frame) = link.recv().await? {
//!     // Process frame
//! }
//! ```

pub mod traits;
pub mod websocket;

pub use traits::{Link, Listener, TransportError};
pub use websocket::{ClientLink, WebSocketConfig, WebSocketLink, WebSocketListener};
