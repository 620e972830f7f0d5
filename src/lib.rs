//! Connection-scaling load test for a publish/subscribe broker.
//!
//! The harness drives batches of simulated clients through the broker's
//! connection-establishment sequence (TCP handshake, transport upgrade,
//! application-level association), measures per-phase timings and
//! success/failure counts, and optionally keeps the established
//! connections alive between runs under a periodic ping sweep.
//!
//! The wire-level client is deliberately external: the harness only
//! depends on the [`client::ProtocolClient`] capability.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod orchestrator;
pub mod pacing;
pub mod run;
pub mod stats;
pub mod task;
pub mod testutil;
