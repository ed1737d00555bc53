//! Mapping strategies (§4.7): pure functions from a vertex set and a peer
//! list to a vertex→peer table. All are deterministic given identical
//! inputs, which is what lets `Cage::distribute` run independently on every
//! peer and still agree.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::MappingError;
use crate::vaddr::{Vid, VAddr};

/// Assigns every VID in `vertices` to one of `peers`. Implementations must
/// map every vertex; leaving one out is `MappingError::UnmappedVertex`.
pub trait Mapping {
    fn assign(&self, vertices: &[Vid], peers: &[VAddr]) -> Result<HashMap<Vid, VAddr>, MappingError>;
}

fn finish(table: HashMap<Vid, VAddr>, vertices: &[Vid]) -> Result<HashMap<Vid, VAddr>, MappingError> {
    for vid in vertices {
        if !table.contains_key(vid) {
            return Err(MappingError::UnmappedVertex(vid.0));
        }
    }
    Ok(table)
}

/// Block-partitions vertices into contiguous, nearly-equal ranges.
#[derive(Debug, Default, Clone, Copy)]
pub struct Consecutive;

impl Mapping for Consecutive {
    fn assign(&self, vertices: &[Vid], peers: &[VAddr]) -> Result<HashMap<Vid, VAddr>, MappingError> {
        if peers.is_empty() {
            return Err(MappingError::UnmappedVertex(0));
        }
        let per_peer = (vertices.len() + peers.len() - 1) / peers.len().max(1);
        let mut table = HashMap::new();
        for (i, vid) in vertices.iter().enumerate() {
            let peer_index = (i / per_peer.max(1)).min(peers.len() - 1);
            table.insert(*vid, peers[peer_index]);
        }
        finish(table, vertices)
    }
}

/// `peer = vid mod peers.len()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl Mapping for RoundRobin {
    fn assign(&self, vertices: &[Vid], peers: &[VAddr]) -> Result<HashMap<Vid, VAddr>, MappingError> {
        if peers.is_empty() {
            return Err(MappingError::UnmappedVertex(0));
        }
        let mut table = HashMap::new();
        for vid in vertices {
            table.insert(*vid, peers[vid.0 as usize % peers.len()]);
        }
        finish(table, vertices)
    }
}

/// Deterministic pseudo-random assignment. The seed is drawn once (by the
/// lowest-VAddr peer, using `rand::thread_rng`) and broadcast during
/// `distribute` so every peer's `Random` instance derives the same table
/// from a `ChaCha8Rng` seeded identically.
#[derive(Debug, Clone, Copy)]
pub struct Random {
    pub seed: u64,
}

impl Mapping for Random {
    fn assign(&self, vertices: &[Vid], peers: &[VAddr]) -> Result<HashMap<Vid, VAddr>, MappingError> {
        if peers.is_empty() {
            return Err(MappingError::UnmappedVertex(0));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut table = HashMap::new();
        for vid in vertices {
            let index = rng.gen_range(0..peers.len());
            table.insert(*vid, peers[index]);
        }
        finish(table, vertices)
    }
}

/// Caller-supplied predicate selecting which peers are eligible; eligible
/// peers claim vertices in a deterministic round-robin sweep.
pub struct Filter<F> {
    pub predicate: F,
}

impl<F> Mapping for Filter<F>
where
    F: Fn(VAddr) -> bool,
{
    fn assign(&self, vertices: &[Vid], peers: &[VAddr]) -> Result<HashMap<Vid, VAddr>, MappingError> {
        let eligible: Vec<VAddr> = peers.iter().copied().filter(|&p| (self.predicate)(p)).collect();
        if eligible.is_empty() {
            return Err(MappingError::UnmappedVertex(0));
        }
        let mut table = HashMap::new();
        for (i, vid) in vertices.iter().enumerate() {
            table.insert(*vid, eligible[i % eligible.len()]);
        }
        finish(table, vertices)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn vids(n: u32) -> Vec<Vid> {
        (0..n).map(Vid).collect()
    }

    fn peers(n: u32) -> Vec<VAddr> {
        (0..n).map(VAddr).collect()
    }

    #[test]
    fn consecutive_splits_into_contiguous_blocks() {
        let table = Consecutive.assign(&vids(6), &peers(3)).unwrap();
        assert_eq!(table[&Vid(0)], VAddr(0));
        assert_eq!(table[&Vid(1)], VAddr(0));
        assert_eq!(table[&Vid(2)], VAddr(1));
        assert_eq!(table[&Vid(5)], VAddr(2));
    }

    #[test]
    fn round_robin_cycles_through_peers() {
        let table = RoundRobin.assign(&vids(5), &peers(3)).unwrap();
        assert_eq!(table[&Vid(0)], VAddr(0));
        assert_eq!(table[&Vid(1)], VAddr(1));
        assert_eq!(table[&Vid(3)], VAddr(0));
    }

    #[test]
    fn random_is_deterministic_given_the_same_seed() {
        let a = Random { seed: 42 }.assign(&vids(10), &peers(3)).unwrap();
        let b = Random { seed: 42 }.assign(&vids(10), &peers(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn filter_only_assigns_to_eligible_peers() {
        let mapping = Filter {
            predicate: |p: VAddr| p.value() % 2 == 0,
        };
        let table = mapping.assign(&vids(4), &peers(4)).unwrap();
        for peer in table.values() {
            assert_eq!(peer.value() % 2, 0);
        }
    }

    #[test]
    fn empty_peer_set_is_unmapped() {
        let err = RoundRobin.assign(&vids(3), &[]).unwrap_err();
        assert_matches!(err, MappingError::UnmappedVertex(_));
    }
}
