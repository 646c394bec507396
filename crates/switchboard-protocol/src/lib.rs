//! # switchboard-protocol
//!
//! Wire protocol definitions for the Switchboard realtime relay.
//!
//! This crate defines the binary protocol spoken between relay clients and
//! servers: frame types, the length-prefixed MessagePack codec, and protocol
//! versioning.
//!
//! ## Frame Types
//!
//! - `Broadcast` - Fan a payload out to every other connection
//! - `Signal` - Deliver a payload to one peer, addressed by peer id
//! - `Bind` - Claim a peer id for the sending connection
//! - `Connect` / `Connected` - Handshake
//! - `Ack` / `Error` - Acknowledgments and errors
//!
//! ## Example
//!
//! ```rust
//! use switchboard_protocol::{codec, Frame};
//!
//! let frame = Frame::signal("peer-42", b"{\"type\":\"offer\"}".to_vec());
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{codes, Frame, FrameType};
pub use version::{is_supported, MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
