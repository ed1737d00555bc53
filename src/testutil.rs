//! In-process multi-peer test harness (§4.12). Feature-gated so production
//! builds never pull it in; enabled automatically under `cfg(test)` and
//! otherwise behind the `testutil` feature for integration tests in
//! `tests/`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::signaling::registry::Registry;
use crate::signaling::server;
use crate::transport::Transport;

/// Binds an in-process signaling server to an ephemeral port and returns
/// its address plus the task serving it.
pub async fn spawn_signaling_server() -> (SocketAddr, JoinHandle<()>) {
    let registry = Arc::new(Registry::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener has a local address");

    let handle = tokio::spawn(async move {
        let _ = server::serve(listener, registry).await;
    });
    (addr, handle)
}

/// Builds `n` transports against a shared in-process signaling server,
/// each binding an ephemeral `peer_uri`, and waits until every one has
/// completed its initial-context barrier.
pub async fn build_peers(n: usize, context_name: &str) -> (SocketAddr, JoinHandle<()>, Vec<Transport>) {
    let (signaling_addr, server_handle) = spawn_signaling_server().await;

    let mut joins = Vec::with_capacity(n);
    for i in 0..n {
        let config = Config::builder(
            format!("tcp://127.0.0.1:{}", 20_000 + i * 2),
            format!("tcp://{signaling_addr}"),
        )
        .context_size(n)
        .context_name(context_name)
        .send_timeout_ms(5_000)
        .recv_timeout_ms(5_000)
        .build()
        .expect("testutil config is always valid");

        joins.push(tokio::spawn(async move { Transport::connect(&config).await }));
    }

    let mut transports = Vec::with_capacity(n);
    for join in joins {
        let transport = join
            .await
            .expect("peer task did not panic")
            .expect("peer connected to the in-process signaling server");
        transports.push(transport);
    }

    (signaling_addr, server_handle, transports)
}

/// Polls `$cond` every `$interval_ms` until it becomes true or `$timeout_ms`
/// elapses, at which point it panics. Ported from the reference helpers of
/// the same name, for assertions that depend on background task progress.
#[macro_export]
macro_rules! wait_until {
    ($timeout_ms:expr, $cond:expr) => {
        $crate::wait_until!($timeout_ms, 10, $cond)
    };
    ($timeout_ms:expr, $interval_ms:expr, $cond:expr) => {{
        let start = ::std::time::Instant::now();
        loop {
            if $cond {
                break;
            }
            if start.elapsed() > ::std::time::Duration::from_millis($timeout_ms) {
                panic!("condition `{}` was not met within {}ms", stringify!($cond), $timeout_ms);
            }
            ::tokio::time::sleep(::std::time::Duration::from_millis($interval_ms)).await;
        }
    }};
}

#[allow(unused_imports)]
pub(crate) use wait_until;

/// Default deadline used by [`build_peers`]-style harness helpers when no
/// more specific timeout is configured by the caller.
pub const DEFAULT_HARNESS_TIMEOUT: Duration = Duration::from_secs(5);
