//! Thin, borrowed handles onto a [`Cage`](super::cage::Cage)'s edges and
//! vertices (§3 "Edge endpoint"). Holding one borrows the overlay
//! immutably, which is enough since graph/mapping state never changes
//! between `set_graph`/`distribute` calls.

use crate::error::CageError;
use crate::substrate::Substrate;
use crate::transport::Event;
use crate::vaddr::{EdgeId, VAddr, Vid};

use super::cage::Cage;
use super::GraphStore;

/// Operational handle `(edge_id, src_vid, dst_vid)` (§3).
pub struct EdgeHandle<'a, S: Substrate, G: GraphStore> {
    cage: &'a Cage<S, G>,
    id: EdgeId,
}

impl<'a, S: Substrate, G: GraphStore> EdgeHandle<'a, S, G> {
    pub(crate) fn new(cage: &'a Cage<S, G>, id: EdgeId) -> Self {
        Self { cage, id }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// Sends `bytes` to the peer hosting this edge's destination vertex,
    /// tagged with the edge's identity.
    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), CageError> {
        self.cage.send_edge(self.id, bytes).await
    }

    /// Receives the next payload sent on this edge by the peer hosting its
    /// source vertex.
    pub async fn recv(&self) -> Result<Vec<u8>, CageError> {
        self.cage.recv_edge(self.id).await
    }
}

/// Operational handle onto a single vertex, exposing the spread/collect/
/// forward/accumulate operations of §4.6.
pub struct VertexHandle<'a, S: Substrate, G: GraphStore> {
    cage: &'a Cage<S, G>,
    id: Vid,
}

impl<'a, S: Substrate, G: GraphStore> VertexHandle<'a, S, G> {
    pub(crate) fn new(cage: &'a Cage<S, G>, id: Vid) -> Self {
        Self { cage, id }
    }

    pub fn id(&self) -> Vid {
        self.id
    }

    /// Sends a copy of `bytes` on every out-edge, returning one pending
    /// send [`Event`] per edge.
    pub async fn spread(&self, bytes: &[u8]) -> Result<Vec<Event<()>>, CageError> {
        self.cage.spread(self.id, bytes).await
    }

    /// Receives one payload per in-edge, concatenated in in-edge-insertion
    /// order.
    pub async fn collect(&self) -> Result<Vec<Vec<u8>>, CageError> {
        self.cage.collect(self.id).await
    }

    /// `collect` then `spread` the (optionally transformed) payload.
    pub async fn forward(&self, transform: impl Fn(Vec<Vec<u8>>) -> Vec<u8>) -> Result<(), CageError> {
        self.cage.forward(self.id, transform).await
    }

    /// `collect` then fold with `op` starting from `init`, in in-edge order.
    pub async fn accumulate<T>(&self, init: T, op: impl Fn(T, Vec<u8>) -> T) -> Result<T, CageError> {
        self.cage.accumulate(self.id, init, op).await
    }

    /// Vertex gather to root (§4.6): over the sub-context of every peer
    /// hosting a vertex of this graph, gathers `input` from each at `root`.
    pub async fn gather_to_root(&self, root: VAddr, input: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CageError> {
        self.cage.gather_to_root(root, input).await
    }

    /// Vertex reduce to root (§4.6): over the same hosting sub-context,
    /// folds `op` over every vertex-hosting peer's `input` at `root`.
    pub async fn reduce_to_root(
        &self,
        root: VAddr,
        input: Vec<u8>,
        op: impl Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    ) -> Result<Option<Vec<u8>>, CageError> {
        self.cage.reduce_to_root(root, input, op).await
    }
}
