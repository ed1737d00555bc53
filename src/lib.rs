//! `cagenet`: a brokerless, graph-overlay communication framework over a
//! push/pull socket transport. Peers register with a signaling server to
//! discover each other, form contexts (initial and negotiated), exchange
//! tagged point-to-point messages, run collective operations over them, and
//! layer a graph overlay (vertices mapped to peers, edges as communication
//! channels) on top.
//!
//! Module map:
//! - [`vaddr`]: identifiers (`VAddr`, `ContextId`, `Tag`, `Vid`, `EdgeId`).
//! - [`error`]: the crate's error enums.
//! - [`config`]: peer configuration, loadable from TOML.
//! - [`message`]: the wire frame format and its `tokio_util` codec.
//! - [`signaling`]: the rendezvous server, its registry, and client calls.
//! - [`transport`]: the `Transport` substrate realization (push/pull socket
//!   pool, recv-matching dispatcher, context negotiation).
//! - [`substrate`]: the `Substrate` trait the overlay is generic over.
//! - [`collective`]: gather/scatter/broadcast/reduce/barrier built atop a
//!   `Substrate`.
//! - [`graph`]: the vertex-to-peer overlay (`Cage`), mapping strategies, and
//!   pattern generators.
//! - [`logging`]: `tracing` subscriber setup.

#![allow(clippy::nonstandard_macro_braces)]

pub mod collective;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod message;
pub mod signaling;
pub mod substrate;
pub mod transport;
pub mod vaddr;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::Config;
pub use error::{CageError, ConfigError, ProtocolError, TransportFailure};
pub use substrate::Substrate;
pub use transport::Transport;
pub use vaddr::{ContextId, EdgeId, Tag, VAddr, Vid};
