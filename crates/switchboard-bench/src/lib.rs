//! Benchmark support crate for Switchboard.
//!
//! The harnesses live under `benches/`: `throughput` covers registry
//! operations and broadcast fan-out, `latency` covers hub and relay routing
//! latency.
