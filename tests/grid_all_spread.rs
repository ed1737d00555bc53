//! Scenario 3 (SPEC_FULL.md §8): a 3x3 eight-neighbour grid, one vertex per
//! peer, every vertex spreading ten bytes of value 5 to its neighbours and
//! collecting the same back from each of them.

use std::sync::Arc;

use cagenet::graph::cage::Cage;
use cagenet::graph::mapping::Consecutive;
use cagenet::graph::pattern::{self, Neighborhood};
use cagenet::graph::GraphDescription;
use cagenet::testutil::build_peers;
use cagenet::Transport;

#[tokio::test]
async fn three_by_three_grid_all_spread_collects_five_from_every_neighbour() {
    let (_signaling_addr, _server, transports) = build_peers(9, "grid-all-spread").await;

    let mut tasks = Vec::new();
    for transport in transports {
        let substrate = Arc::new(transport);
        tasks.push(tokio::spawn(async move {
            let mut cage = Cage::<Transport, GraphDescription>::new(substrate);
            cage.set_graph(pattern::grid(3, 3, Neighborhood::Eight)).await.unwrap();
            cage.distribute(&Consecutive).unwrap();

            let vid = cage.hosted_vertices()[0];
            let vertex = cage.vertex(vid);

            let payload = vec![5u8; 10];
            for event in vertex.spread(&payload).await.unwrap() {
                event.wait().await.unwrap();
            }

            let collected = vertex.collect().await.unwrap();
            let in_edges = collected.len();
            assert_eq!(collected.iter().map(Vec::len).sum::<usize>(), in_edges * 10);
            for buf in &collected {
                assert!(buf.iter().all(|&b| b == 5));
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}
