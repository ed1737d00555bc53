//! Scenario 6 (SPEC_FULL.md §8): peer B joins 500ms after peer A. A's edge
//! send to B must not be lost while B's endpoint is still unknown to the
//! signaling server; the client-side `VAddrLookup` retry/backoff in
//! `signaling::client` is what makes this work.

use std::sync::Arc;
use std::time::Duration;

use cagenet::config::Config;
use cagenet::graph::cage::Cage;
use cagenet::graph::mapping::Consecutive;
use cagenet::graph::pattern;
use cagenet::graph::GraphDescription;
use cagenet::testutil::spawn_signaling_server;
use cagenet::vaddr::Vid;
use cagenet::Transport;

#[tokio::test]
async fn peer_arriving_500ms_late_still_completes_delivery() {
    let (signaling_addr, _server) = spawn_signaling_server().await;

    let config_a = Config::builder("tcp://127.0.0.1:21100", format!("tcp://{signaling_addr}"))
        .context_size(2)
        .context_name("late-arrival")
        .send_timeout_ms(5_000)
        .recv_timeout_ms(5_000)
        .build()
        .unwrap();
    let a_task = tokio::spawn(async move { Transport::connect(&config_a).await });

    tokio::time::sleep(Duration::from_millis(500)).await;

    let config_b = Config::builder("tcp://127.0.0.1:21102", format!("tcp://{signaling_addr}"))
        .context_size(2)
        .context_name("late-arrival")
        .send_timeout_ms(5_000)
        .recv_timeout_ms(5_000)
        .build()
        .unwrap();
    let transport_b = Transport::connect(&config_b).await.unwrap();
    let transport_a = a_task.await.unwrap().unwrap();

    let mut cage_a = Cage::<Transport, GraphDescription>::new(Arc::new(transport_a));
    cage_a.set_graph(pattern::chain(2)).await.unwrap();
    cage_a.distribute(&Consecutive).unwrap();

    let mut cage_b = Cage::<Transport, GraphDescription>::new(Arc::new(transport_b));
    cage_b.set_graph(pattern::chain(2)).await.unwrap();
    cage_b.distribute(&Consecutive).unwrap();

    let sender = tokio::spawn(async move {
        let vertex = cage_a.vertex(Vid(0));
        for event in vertex.spread(b"late-hello").await.unwrap() {
            event.wait().await.unwrap();
        }
    });
    let receiver = tokio::spawn(async move {
        let vertex = cage_b.vertex(Vid(1));
        let collected = vertex.collect().await.unwrap();
        assert_eq!(collected, vec![b"late-hello".to_vec()]);
    });

    sender.await.unwrap();
    receiver.await.unwrap();
}
