//! Scenario 2 (SPEC_FULL.md §8): four vertices in a ring, one per peer,
//! each hop incrementing a counter and extending a greeting string.

use std::sync::Arc;

use cagenet::graph::cage::Cage;
use cagenet::graph::mapping::Consecutive;
use cagenet::graph::pattern;
use cagenet::graph::GraphDescription;
use cagenet::testutil::build_peers;
use cagenet::vaddr::Vid;
use cagenet::Transport;

fn encode(counter: u32, greeting: &str) -> Vec<u8> {
    let mut buf = counter.to_le_bytes().to_vec();
    buf.extend_from_slice(greeting.as_bytes());
    buf
}

fn decode(bytes: &[u8]) -> (u32, String) {
    let counter = u32::from_le_bytes(bytes[..4].try_into().unwrap());
    let greeting = String::from_utf8(bytes[4..].to_vec()).unwrap();
    (counter, greeting)
}

#[tokio::test]
async fn ring_of_four_accumulates_counter_and_greeting() {
    let (_signaling_addr, _server, transports) = build_peers(4, "ring-transform").await;

    let mut tasks = Vec::new();
    for transport in transports {
        let substrate = Arc::new(transport);
        tasks.push(tokio::spawn(async move {
            let mut cage = Cage::<Transport, GraphDescription>::new(substrate);
            cage.set_graph(pattern::ring(4)).await.unwrap();
            cage.distribute(&Consecutive).unwrap();

            for vid in cage.hosted_vertices().to_vec() {
                let vertex = cage.vertex(vid);
                if vid == Vid(0) {
                    let initial = encode(0, "hello");
                    for event in vertex.spread(&initial).await.unwrap() {
                        event.wait().await.unwrap();
                    }
                    let collected = vertex.collect().await.unwrap();
                    let (counter, greeting) = decode(&collected[0]);
                    assert_eq!(counter, 4);
                    assert_eq!(greeting, "hello world world world world");
                } else {
                    vertex
                        .forward(|inputs| {
                            let (counter, greeting) = decode(&inputs[0]);
                            encode(counter + 1, &format!("{greeting} world"))
                        })
                        .await
                        .unwrap();
                }
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}
