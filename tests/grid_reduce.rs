//! Scenario 4 (SPEC_FULL.md §8): the same 3x3 grid, every peer contributing
//! its own VID to a `reduce` at the vertex-0 peer, which should see the sum
//! of 0..=8.

use std::sync::Arc;

use cagenet::graph::cage::Cage;
use cagenet::graph::mapping::Consecutive;
use cagenet::graph::pattern::{self, Neighborhood};
use cagenet::graph::GraphDescription;
use cagenet::testutil::build_peers;
use cagenet::Transport;

fn add_u64_le(a: Vec<u8>, b: Vec<u8>) -> Vec<u8> {
    let x = u64::from_le_bytes(a.try_into().unwrap());
    let y = u64::from_le_bytes(b.try_into().unwrap());
    (x + y).to_le_bytes().to_vec()
}

#[tokio::test]
async fn reduce_over_three_by_three_grid_sums_vertex_ids() {
    let (_signaling_addr, _server, transports) = build_peers(9, "grid-reduce").await;

    let mut tasks = Vec::new();
    for transport in transports {
        let substrate = Arc::new(transport);
        tasks.push(tokio::spawn(async move {
            let mut cage = Cage::<Transport, GraphDescription>::new(Arc::clone(&substrate));
            cage.set_graph(pattern::grid(3, 3, Neighborhood::Eight)).await.unwrap();
            cage.distribute(&Consecutive).unwrap();

            let vid = cage.hosted_vertices()[0];
            let hosting_ctx = cage.hosting_context().await.unwrap();
            let root = hosting_ctx.coordinator().unwrap();
            let local_input = (vid.0 as u64).to_le_bytes().to_vec();

            let folded = cage.reduce_to_root(root, local_input, add_u64_le).await.unwrap();

            if substrate.vaddr() == root {
                let total = u64::from_le_bytes(folded.unwrap().try_into().unwrap());
                assert_eq!(total, 36);
            } else {
                assert!(folded.is_none());
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}
