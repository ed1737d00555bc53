//! The graph overlay itself (§4.6): binds an immutable graph description, a
//! vertex→peer mapping, and a `Substrate` into vertex- and edge-level
//! operations.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::instrument;

use crate::collective;
use crate::error::{CageError, MappingError};
use crate::substrate::Substrate;
use crate::transport::{Context, Event};
use crate::vaddr::{EdgeId, Tag, VAddr, Vid};

use super::mapping::Mapping;
use super::vertex::{EdgeHandle, VertexHandle};
use super::{GraphDescription, GraphStore};

/// The graph overlay bound to a transport `S` and graph backend `G`.
pub struct Cage<S: Substrate, G: GraphStore> {
    substrate: Arc<S>,
    graph: Option<Arc<G>>,
    mapping: HashMap<Vid, crate::vaddr::VAddr>,
    hosted: Vec<Vid>,
    context: Context,
    verify_graph_hash: bool,
}

impl<S: Substrate> Cage<S, GraphDescription> {
    pub fn new(substrate: Arc<S>) -> Self {
        let context = substrate.initial_context().clone();
        Self {
            substrate,
            graph: None,
            mapping: HashMap::new(),
            hosted: Vec::new(),
            context,
            verify_graph_hash: false,
        }
    }

    pub fn with_verify_graph_hash(mut self, verify: bool) -> Self {
        self.verify_graph_hash = verify;
        self
    }
}

impl<S: Substrate, G: GraphStore> Cage<S, G> {
    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn graph(&self) -> Option<&G> {
        self.graph.as_deref()
    }

    /// Installs `description` as this peer's graph. Collective: every peer
    /// must call this with an identical description. Rejected with
    /// `MappingError::TooManyEdges` if the graph has more edges than fit
    /// below the tag space's collective-engine reservation (§4.9). When
    /// `verify_graph_hash` is enabled, exchanges a SHA-256 hash across a
    /// barrier first and fails fast on mismatch.
    #[instrument(skip(self, description))]
    pub async fn set_graph(&mut self, description: G) -> Result<(), CageError>
    where
        G: HasCanonicalHash,
    {
        check_edge_budget(description.edges().len(), Tag::MAX_EDGE_TAG as usize).map_err(CageError::Mapping)?;

        if self.verify_graph_hash {
            self.barrier_check_hash(description.canonical_hash()).await?;
        }
        self.graph = Some(Arc::new(description));
        Ok(())
    }

    async fn barrier_check_hash(&self, local_hash: [u8; 32]) -> Result<(), CageError> {
        let ctx = self.context.clone();
        let peers: Vec<_> = ctx.members().iter().copied().filter(|&p| p != self.substrate.vaddr()).collect();
        let tag = Tag::collective(2);

        for &peer in &peers {
            self.substrate
                .async_send(peer, tag, ctx.id(), local_hash.to_vec())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
        }
        for &peer in &peers {
            let remote_hash = self
                .substrate
                .async_recv(peer, tag, ctx.id())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
            if remote_hash != local_hash {
                return Err(CageError::Mapping(MappingError::InconsistentGraph));
            }
        }
        Ok(())
    }

    /// Runs `mapping` to produce the vertex→peer table and rebuilds this
    /// peer's hosted-vertex set. Identical inputs on every peer must yield
    /// identical output; the caller is responsible for feeding every peer
    /// the same `mapping` parameters (e.g. the same `Random` seed).
    pub fn distribute<M: Mapping>(&mut self, mapping: &M) -> Result<(), CageError> {
        let graph = self.graph.as_ref().ok_or(CageError::Mapping(MappingError::InconsistentGraph))?;
        let table = mapping.assign(graph.vertices(), self.context.members())?;
        self.hosted = graph
            .vertices()
            .iter()
            .copied()
            .filter(|vid| table.get(vid) == Some(&self.substrate.vaddr()))
            .collect();
        self.mapping = table;
        Ok(())
    }

    pub fn hosted_vertices(&self) -> &[Vid] {
        &self.hosted
    }

    pub fn vaddr_of(&self, vid: Vid) -> Option<crate::vaddr::VAddr> {
        self.mapping.get(&vid).copied()
    }

    pub fn edge(&self, edge: EdgeId) -> EdgeHandle<'_, S, G> {
        EdgeHandle::new(self, edge)
    }

    pub fn vertex(&self, vid: Vid) -> VertexHandle<'_, S, G> {
        VertexHandle::new(self, vid)
    }

    pub(crate) async fn send_edge(&self, edge: EdgeId, bytes: Vec<u8>) -> Result<(), CageError> {
        let (_, dst_vid) = self.graph_ref()?.edge_endpoints(edge);
        let dst = self.vaddr_of(dst_vid).ok_or(MappingError::UnmappedVertex(dst_vid.0))?;
        self.substrate
            .async_send(dst, edge.as_tag(), self.context.id(), bytes)
            .await
            .wait()
            .await
            .map_err(CageError::Transport)
    }

    pub(crate) async fn recv_edge(&self, edge: EdgeId) -> Result<Vec<u8>, CageError> {
        let (src_vid, _) = self.graph_ref()?.edge_endpoints(edge);
        let src = self.vaddr_of(src_vid).ok_or(MappingError::UnmappedVertex(src_vid.0))?;
        self.substrate
            .async_recv(src, edge.as_tag(), self.context.id())
            .await
            .wait()
            .await
            .map_err(CageError::Transport)
    }

    fn graph_ref(&self) -> Result<&G, CageError> {
        self.graph.as_deref().ok_or(CageError::Mapping(MappingError::InconsistentGraph))
    }

    /// Spreads `bytes` on every out-edge of `vid`, returning one pending
    /// send per edge.
    pub(crate) async fn spread(&self, vid: Vid, bytes: &[u8]) -> Result<Vec<Event<()>>, CageError> {
        let out_edges = self.graph_ref()?.out_edges(vid);
        let mut events = Vec::with_capacity(out_edges.len());
        for edge in out_edges {
            let (_, dst_vid) = self.graph_ref()?.edge_endpoints(edge);
            let dst = self.vaddr_of(dst_vid).ok_or(MappingError::UnmappedVertex(dst_vid.0))?;
            events.push(
                self.substrate
                    .async_send(dst, edge.as_tag(), self.context.id(), bytes.to_vec())
                    .await,
            );
        }
        Ok(events)
    }

    /// Receives exactly one payload on every in-edge of `vid`, concatenated
    /// in in-edge-insertion order.
    pub(crate) async fn collect(&self, vid: Vid) -> Result<Vec<Vec<u8>>, CageError> {
        let in_edges = self.graph_ref()?.in_edges(vid);
        let mut results = Vec::with_capacity(in_edges.len());
        for edge in in_edges {
            results.push(self.recv_edge(edge).await?);
        }
        Ok(results)
    }

    /// `collect` then `spread` the (optionally transformed) result. Requires
    /// `|in-edges| == |out-edges|`.
    pub async fn forward(&self, vid: Vid, transform: impl Fn(Vec<Vec<u8>>) -> Vec<u8>) -> Result<(), CageError> {
        let in_count = self.graph_ref()?.in_edges(vid).len();
        let out_count = self.graph_ref()?.out_edges(vid).len();
        if in_count != out_count {
            return Err(CageError::Mapping(MappingError::EdgeArityMismatch {
                in_edges: in_count,
                out_edges: out_count,
            }));
        }
        let collected = self.collect(vid).await?;
        let payload = transform(collected);
        for event in self.spread(vid, &payload).await? {
            event.wait().await.map_err(CageError::Transport)?;
        }
        Ok(())
    }

    /// `collect` then fold with `op` starting from `init`, in in-edge order.
    pub async fn accumulate<T>(
        &self,
        vid: Vid,
        init: T,
        op: impl Fn(T, Vec<u8>) -> T,
    ) -> Result<T, CageError> {
        let collected = self.collect(vid).await?;
        Ok(collected.into_iter().fold(init, op))
    }

    /// Derives the sub-`Context` covering every peer this graph's mapping
    /// assigns at least one vertex to, via `Substrate::create_context` over
    /// the overlay's own context. Only peers hosting a vertex need call this;
    /// recomputed on every call since the hosted set can change across a
    /// `distribute`.
    pub async fn hosting_context(&self) -> Result<Context, CageError> {
        let mut members: Vec<VAddr> = self.mapping.values().copied().collect();
        members.sort_unstable();
        members.dedup();
        self.substrate.create_context(members, &self.context).await
    }

    /// Vertex gather to root (§4.6): every peer hosting a vertex sends
    /// `input` to `root` over the hosting sub-context; `root` assembles the
    /// results in VAddr-ascending order. Non-root callers get `None`.
    pub async fn gather_to_root(&self, root: VAddr, input: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CageError> {
        let ctx = self.hosting_context().await?;
        collective::gather(self.substrate.as_ref(), &ctx, root, input).await
    }

    /// Vertex reduce to root (§4.6): folds `op` over every vertex-hosting
    /// peer's `input` at `root`, over the hosting sub-context. Non-root
    /// callers get `None`.
    pub async fn reduce_to_root(
        &self,
        root: VAddr,
        input: Vec<u8>,
        op: impl Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    ) -> Result<Option<Vec<u8>>, CageError> {
        let ctx = self.hosting_context().await?;
        collective::reduce(self.substrate.as_ref(), &ctx, root, input, op).await
    }

    /// Draws a seed on the lowest-ranked member of `ctx` and broadcasts it,
    /// so every peer's `Random` mapping derives the same table.
    pub async fn shared_random_seed(&self) -> Result<u64, CageError> {
        let ctx = self.context.clone();
        let coordinator = ctx.coordinator().ok_or(MappingError::InconsistentGraph)?;
        let tag = Tag::collective(3);

        if self.substrate.vaddr() == coordinator {
            let seed: u64 = rand::thread_rng().gen();
            for &peer in ctx.members().iter().filter(|&&p| p != coordinator) {
                self.substrate
                    .async_send(peer, tag, ctx.id(), seed.to_le_bytes().to_vec())
                    .await
                    .wait()
                    .await
                    .map_err(CageError::Transport)?;
            }
            Ok(seed)
        } else {
            let bytes = self
                .substrate
                .async_recv(coordinator, tag, ctx.id())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
            let array: [u8; 8] = bytes.try_into().map_err(|_| CageError::Mapping(MappingError::InconsistentGraph))?;
            Ok(u64::from_le_bytes(array))
        }
    }
}

/// Narrow trait so `set_graph` can hash whatever `G` the caller installs
/// without requiring every `GraphStore` implementation to carry `sha2` as a
/// dependency just to satisfy this one optional feature.
pub trait HasCanonicalHash {
    fn canonical_hash(&self) -> [u8; 32];
}

impl HasCanonicalHash for GraphDescription {
    fn canonical_hash(&self) -> [u8; 32] {
        GraphDescription::canonical_hash(self)
    }
}

/// Pulled out of `set_graph` so the bound can be exercised directly, without
/// constructing a graph anywhere near `Tag::MAX_EDGE_TAG` edges.
fn check_edge_budget(edge_count: usize, max: usize) -> Result<(), MappingError> {
    if edge_count > max {
        Err(MappingError::TooManyEdges { edge_count, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn edge_budget_accepts_counts_at_the_limit() {
        assert!(check_edge_budget(10, 10).is_ok());
    }

    #[test]
    fn edge_budget_rejects_counts_above_the_limit() {
        let err = check_edge_budget(11, 10).unwrap_err();
        assert_matches!(err, MappingError::TooManyEdges { edge_count: 11, max: 10 });
    }
}
