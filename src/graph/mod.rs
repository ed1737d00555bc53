//! The graph overlay: a `GraphStore` abstraction (§4.9), the in-memory
//! `GraphDescription` that pattern generators produce, vertex-to-peer
//! mapping strategies, and the `Cage` overlay tying them to a `Substrate`.

pub mod cage;
pub mod mapping;
pub mod pattern;
pub mod vertex;

use sha2::{Digest, Sha256};

use crate::vaddr::{EdgeId, Vid};

/// Everything the overlay needs from a graph-storage backend (§4.9). The
/// crate's own `GraphDescription` is a minimal in-memory implementation;
/// applications with a real graph library behind them implement this trait
/// directly over their own storage instead of going through it.
pub trait GraphStore {
    fn vertices(&self) -> &[Vid];
    fn edges(&self) -> &[(Vid, Vid)];
    fn out_edges(&self, vid: Vid) -> Vec<EdgeId>;
    fn in_edges(&self, vid: Vid) -> Vec<EdgeId>;
    fn edge_endpoints(&self, edge: EdgeId) -> (Vid, Vid);
}

/// An immutable vertex/edge set, as produced by a pattern generator (§4.8)
/// and installed once via `Cage::set_graph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDescription {
    vertices: Vec<Vid>,
    edges: Vec<(Vid, Vid)>,
}

impl GraphDescription {
    pub fn new(vertex_count: u32, edges: Vec<(Vid, Vid)>) -> Self {
        Self {
            vertices: (0..vertex_count).map(Vid).collect(),
            edges,
        }
    }

    /// A stable, order-dependent byte encoding used by `verify_graph_hash`
    /// to detect disagreement between peers before committing to a mapping.
    pub fn canonical_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.vertices.len() as u32).to_le_bytes());
        for (src, dst) in &self.edges {
            hasher.update(src.0.to_le_bytes());
            hasher.update(dst.0.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

impl GraphStore for GraphDescription {
    fn vertices(&self) -> &[Vid] {
        &self.vertices
    }

    fn edges(&self) -> &[(Vid, Vid)] {
        &self.edges
    }

    fn out_edges(&self, vid: Vid) -> Vec<EdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, (src, _))| *src == vid)
            .map(|(i, _)| EdgeId(i as u32))
            .collect()
    }

    fn in_edges(&self, vid: Vid) -> Vec<EdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, (_, dst))| *dst == vid)
            .map(|(i, _)| EdgeId(i as u32))
            .collect()
    }

    fn edge_endpoints(&self, edge: EdgeId) -> (Vid, Vid) {
        self.edges[edge.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_and_in_edges_reflect_insertion_order() {
        let graph = GraphDescription::new(3, vec![(Vid(0), Vid(1)), (Vid(1), Vid(2))]);
        assert_eq!(graph.out_edges(Vid(0)), vec![EdgeId(0)]);
        assert_eq!(graph.out_edges(Vid(1)), vec![EdgeId(1)]);
        assert_eq!(graph.in_edges(Vid(2)), vec![EdgeId(1)]);
        assert!(graph.in_edges(Vid(0)).is_empty());
    }

    #[test]
    fn identical_graphs_hash_identically() {
        let a = GraphDescription::new(2, vec![(Vid(0), Vid(1))]);
        let b = GraphDescription::new(2, vec![(Vid(0), Vid(1))]);
        assert_eq!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn differing_graphs_hash_differently() {
        let a = GraphDescription::new(2, vec![(Vid(0), Vid(1))]);
        let b = GraphDescription::new(2, vec![(Vid(1), Vid(0))]);
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }
}
