//! # switchboard-core
//!
//! Core components of the Switchboard realtime relay.
//!
//! - **Registry** - The authoritative map of live connections and peer aliases
//! - **BroadcastHub** - Fan-out of a payload to every live connection
//! - **SignalRelay** - Directed delivery to one peer, addressed by alias
//! - **Connection** - Identity, bounded outbox, and lifecycle per connection
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!            ┌──────▶│ BroadcastHub │──┐
//! ┌────────┐ │       └──────────────┘  │   ┌─────────────┐
//! │Listener│─┤                         ├──▶│   Outbox    │
//! └────────┘ │       ┌──────────────┐  │   │(per-session)│
//!            └──────▶│ SignalRelay  │──┘   └─────────────┘
//!                    └──────┬───────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │   Registry   │
//!                    └──────────────┘
//! ```
//!
//! The registry is the only shared mutable state; the hub and relay resolve
//! connections through it per delivery and push pre-encoded frames into
//! per-connection bounded outboxes.

pub mod connection;
pub mod hub;
pub mod registry;
pub mod signal;

pub use connection::{ConnState, ConnectionId, Lifecycle, Outbox, PeerId};
pub use hub::{BroadcastHub, Fanout, HubConfig};
pub use registry::{Registration, Registry, RegistryConfig, RegistryError, RegistryStats};
pub use signal::{SignalError, SignalRelay};
