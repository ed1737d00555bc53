//! Scenario 1 (SPEC_FULL.md §8): six vertices in a chain, round-robin mapped
//! over three peers, each intermediate vertex incrementing the payload it
//! forwards.

use std::sync::Arc;

use cagenet::graph::cage::Cage;
use cagenet::graph::mapping::RoundRobin;
use cagenet::graph::pattern;
use cagenet::graph::GraphDescription;
use cagenet::testutil::build_peers;
use cagenet::vaddr::Vid;
use cagenet::Transport;

#[tokio::test]
async fn chain_of_six_increments_to_four_at_the_far_end() {
    let (_signaling_addr, _server, transports) = build_peers(3, "chain-increment").await;

    let mut tasks = Vec::new();
    for transport in transports {
        let substrate = Arc::new(transport);
        tasks.push(tokio::spawn(async move {
            let mut cage = Cage::<Transport, GraphDescription>::new(substrate);
            cage.set_graph(pattern::chain(6)).await.unwrap();
            cage.distribute(&RoundRobin).unwrap();

            for vid in cage.hosted_vertices().to_vec() {
                let vertex = cage.vertex(vid);
                if vid == Vid(0) {
                    for event in vertex.spread(&[0u8]).await.unwrap() {
                        event.wait().await.unwrap();
                    }
                } else if vid == Vid(5) {
                    let collected = vertex.collect().await.unwrap();
                    assert_eq!(collected, vec![vec![4u8]]);
                } else {
                    vertex.forward(|inputs| vec![inputs[0][0] + 1]).await.unwrap();
                }
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}
