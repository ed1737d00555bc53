//! Error types for every fallible surface of the crate.
//!
//! Each kind below is a plain enum with a hand-written [`Display`]/[`Error`]
//! impl rather than a derive-macro crate, so the failure messages read the
//! way the rest of this codebase's error types do.

use std::fmt;
use std::io;
use std::time::Duration;

/// Malformed configuration, caught once at construction time.
#[derive(Debug)]
pub enum ConfigError {
    InvalidUri(String),
    InvalidTimeout { field: &'static str, millis: u64 },
    ContextSizeConflict {
        context_name: String,
        requested: usize,
        registered: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidUri(uri) => write!(f, "invalid peer/signaling URI: {uri}"),
            ConfigError::InvalidTimeout { field, millis } => {
                write!(f, "invalid value for {field}: {millis}ms")
            }
            ConfigError::ContextSizeConflict {
                context_name,
                requested,
                registered,
            } => write!(
                f,
                "context {context_name:?} already registered with size {registered}, \
                 but this peer requested {requested}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A fatal violation of the wire protocol. The process should not continue
/// once one of these has been observed.
#[derive(Debug)]
pub enum ProtocolError {
    UnknownMessageType(u8),
    HeaderTooShort { expected: usize, actual: usize },
    DuplicateDelivery { source: u32, tag: u32, context: u32 },
    InvalidContext(u32),
    Io(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownMessageType(byte) => {
                write!(f, "unknown message type byte: {byte:#04x}")
            }
            ProtocolError::HeaderTooShort { expected, actual } => write!(
                f,
                "header too short: expected {expected} bytes, got {actual}"
            ),
            ProtocolError::DuplicateDelivery {
                source,
                tag,
                context,
            } => write!(
                f,
                "duplicate delivery on matched key (source={source}, tag={tag}, context={context})"
            ),
            ProtocolError::InvalidContext(id) => {
                write!(f, "operation attempted on invalid context {id}")
            }
            ProtocolError::Io(err) => write!(f, "protocol I/O error: {err}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        ProtocolError::Io(err)
    }
}

/// Soft transport failures, surfaced on the affected [`Event`](crate::transport::Event)
/// rather than killing the process.
#[derive(Debug)]
pub enum TransportFailure {
    /// A send/recv exceeded its configured timeout. Retried once automatically
    /// before being surfaced.
    Timeout(Duration),
    /// The control channel reported the peer's `Destruct` while a recv to/from
    /// it was still pending.
    PeerGone(u32),
    /// The owning transport was torn down while this operation was pending.
    Cancelled,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::Timeout(d) => write!(f, "timed out after {:.3}s", d.as_secs_f64()),
            TransportFailure::PeerGone(vaddr) => write!(f, "peer {vaddr} has torn down"),
            TransportFailure::Cancelled => write!(f, "cancelled by transport shutdown"),
        }
    }
}

impl std::error::Error for TransportFailure {}

/// Errors raised by the graph overlay's mapping and vertex-collective logic.
#[derive(Debug)]
pub enum MappingError {
    UnmappedVertex(u32),
    InconsistentGraph,
    EdgeArityMismatch { in_edges: usize, out_edges: usize },
    TooManyEdges { edge_count: usize, max: usize },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::UnmappedVertex(vid) => write!(f, "vertex {vid} was left unmapped"),
            MappingError::InconsistentGraph => {
                write!(f, "peers disagree on the installed graph description")
            }
            MappingError::EdgeArityMismatch {
                in_edges,
                out_edges,
            } => write!(
                f,
                "forward requires equal in/out edge counts, got {in_edges} in, {out_edges} out"
            ),
            MappingError::TooManyEdges { edge_count, max } => write!(
                f,
                "graph has {edge_count} edges, which exceeds the {max} edges the tag space allows"
            ),
        }
    }
}

impl std::error::Error for MappingError {}

/// The top-level error any public, fallible crate operation can return.
#[derive(Debug)]
pub enum CageError {
    Config(ConfigError),
    Protocol(ProtocolError),
    Transport(TransportFailure),
    Mapping(MappingError),
}

impl fmt::Display for CageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CageError::Config(e) => write!(f, "{e}"),
            CageError::Protocol(e) => write!(f, "{e}"),
            CageError::Transport(e) => write!(f, "{e}"),
            CageError::Mapping(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CageError::Config(e) => Some(e),
            CageError::Protocol(e) => Some(e),
            CageError::Transport(e) => Some(e),
            CageError::Mapping(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CageError {
    fn from(e: ConfigError) -> Self {
        CageError::Config(e)
    }
}

impl From<ProtocolError> for CageError {
    fn from(e: ProtocolError) -> Self {
        CageError::Protocol(e)
    }
}

impl From<TransportFailure> for CageError {
    fn from(e: TransportFailure) -> Self {
        CageError::Transport(e)
    }
}

impl From<MappingError> for CageError {
    fn from(e: MappingError) -> Self {
        CageError::Mapping(e)
    }
}

pub type Result<T, E = CageError> = std::result::Result<T, E>;
