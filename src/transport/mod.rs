//! The socket-backed realization of the `Substrate` contract (§4.2-§4.4):
//! connection setup against the signaling server, context management, and
//! tagged point-to-point send/recv over a dedicated push/pull socket pool.

pub mod context;
pub mod dispatcher;
pub mod event;
pub mod socket_pool;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{CageError, ProtocolError, TransportFailure};
use crate::message::payload::{Codec as PayloadCodec, ContextInitPayload, SplitPayload};
use crate::message::Message;
use crate::signaling::client;
use crate::vaddr::{ContextId, Tag, VAddr};

pub use context::Context;
pub use event::Event;

const DISPATCH_CHANNEL_CAPACITY: usize = 1024;
/// Reserved tag slot used for `create_context`/`split_context` negotiation.
const CONTEXT_BUILD_TAG: Tag = Tag::collective(1);

/// A connected peer's socket-backed transport: one per process in the
/// reference deployment, one per test in the in-process harness.
pub struct Transport {
    vaddr: VAddr,
    initial_context: Context,
    signaling_addr: std::net::SocketAddr,
    data_pool: socket_pool::PushPool,
    control_pool: socket_pool::PushPool,
    peer_endpoints: HashMap<VAddr, std::net::SocketAddr>,
    cmd_tx: mpsc::Sender<dispatcher::Request>,
    send_timeout: Duration,
    recv_timeout: Duration,
    next_context_counter: AtomicU32,
}

impl Transport {
    /// Performs the full peer startup sequence: bind the pull and control
    /// listeners, register with the signaling server, wait for the initial
    /// context's full membership, then connect a push socket to every peer.
    #[instrument(skip(config), fields(peer_uri = %config.peer_uri))]
    pub async fn connect(config: &Config) -> Result<Self, CageError> {
        let preferred = crate::config::parse_peer_addr(&config.peer_uri)?;
        let (pull_listener, pull_addr) = socket_pool::bind_with_increment(preferred).await
            .map_err(|_| CageError::Config(crate::error::ConfigError::InvalidUri(config.peer_uri.clone())))?;

        let mut control_preferred = pull_addr;
        control_preferred.set_port(pull_addr.port() + 1);
        let (control_listener, control_addr) =
            socket_pool::bind_with_increment(control_preferred).await
                .map_err(|_| CageError::Config(crate::error::ConfigError::InvalidUri(config.peer_uri.clone())))?;

        let signaling_addr = crate::config::parse_peer_addr(&config.signaling_uri)?;
        let endpoint_uri = format!("tcp://{pull_addr}");
        let vaddr = client::request_vaddr(
            signaling_addr,
            &endpoint_uri,
            config.context_size,
            &config.context_name,
        )
        .await?;
        info!(%vaddr, %pull_addr, %control_addr, "registered with signaling server");

        let (context_id, members) = client::request_context(
            signaling_addr,
            &config.context_name,
            config.recv_timeout * (config.context_size as u32).max(1),
        )
        .await
        .map_err(CageError::Transport)?;
        let initial_context = Context::new(context_id, members.clone());

        let (incoming_tx, incoming_rx) = mpsc::channel(DISPATCH_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(DISPATCH_CHANNEL_CAPACITY);
        tokio::spawn(dispatcher::run(incoming_rx, cmd_rx));
        tokio::spawn(socket_pool::accept_loop(pull_listener, incoming_tx.clone()));
        tokio::spawn(socket_pool::accept_loop(control_listener, incoming_tx));

        let data_pool = socket_pool::PushPool::new(vaddr);
        let control_pool = socket_pool::PushPool::new(vaddr);
        let mut peer_endpoints = HashMap::new();

        for &peer in &members {
            if peer == vaddr {
                continue;
            }
            let peer_main_uri = client::lookup_peer(signaling_addr, peer, config.recv_timeout)
                .await
                .map_err(CageError::Transport)?;
            let peer_addr = crate::config::parse_peer_addr(&peer_main_uri)?;
            let mut peer_control_addr = peer_addr;
            peer_control_addr.set_port(peer_addr.port() + 1);

            data_pool
                .connect(peer, peer_addr)
                .await
                .map_err(|_| CageError::Transport(TransportFailure::PeerGone(peer.value())))?;
            control_pool
                .connect(peer, peer_control_addr)
                .await
                .map_err(|_| CageError::Transport(TransportFailure::PeerGone(peer.value())))?;

            peer_endpoints.insert(peer, peer_addr);
        }

        Ok(Self {
            vaddr,
            initial_context,
            signaling_addr,
            data_pool,
            control_pool,
            peer_endpoints,
            cmd_tx,
            send_timeout: config.send_timeout,
            recv_timeout: config.recv_timeout,
            next_context_counter: AtomicU32::new(0),
        })
    }

    pub fn vaddr(&self) -> VAddr {
        self.vaddr
    }

    pub fn initial_context(&self) -> &Context {
        &self.initial_context
    }

    /// Sends `bytes` to `dst` under `tag`/`context`. Resolves once the frame
    /// is enqueued on the destination's push channel.
    pub async fn async_send(&self, dst: VAddr, tag: Tag, context: ContextId, bytes: Vec<u8>) -> Event<()> {
        match tokio::time::timeout(self.send_timeout, self.data_pool.send_data(dst, tag, context, bytes)).await {
            Ok(Ok(())) => Event::ready(Ok(())),
            Ok(Err(dest)) => Event::ready(Err(TransportFailure::PeerGone(dest.value()))),
            Err(_) => Event::ready(Err(TransportFailure::Timeout(self.send_timeout))),
        }
    }

    /// Posts a recv for exactly one `(src, tag, context)` delivery. Matches
    /// immediately against a queued message if one already arrived.
    pub async fn async_recv(&self, src: VAddr, tag: Tag, context: ContextId) -> Event<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = dispatcher::Request::PostRecv {
            key: (src, tag, context),
            reply: reply_tx,
        };
        if self.cmd_tx.send(request).await.is_err() {
            return Event::ready(Err(TransportFailure::Cancelled));
        }

        let recv_timeout = self.recv_timeout;
        let (outer_tx, outer_rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(recv_timeout, reply_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TransportFailure::Cancelled),
                Err(_) => Err(TransportFailure::Timeout(recv_timeout)),
            };
            let _ = outer_tx.send(outcome);
        });
        Event::pending(outer_rx)
    }

    /// Match-any recv within `context`: returns the next arrival from any
    /// source/tag once one exists.
    pub async fn recv(&self, context: ContextId) -> Result<(VAddr, Tag, Vec<u8>), TransportFailure> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(dispatcher::Request::RecvAny { context, reply: reply_tx })
            .await
            .map_err(|_| TransportFailure::Cancelled)?;
        match tokio::time::timeout(self.recv_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportFailure::Cancelled),
            Err(_) => Err(TransportFailure::Timeout(self.recv_timeout)),
        }
    }

    fn allocate_context_id(&self, coordinator: VAddr) -> ContextId {
        let local = self.next_context_counter.fetch_add(1, Ordering::Relaxed);
        ContextId((coordinator.value() << 16) | (local & 0xFFFF))
    }

    /// Collective: every member of `members` sends a join announcement to
    /// the lowest-VAddr coordinator, which allocates a fresh context ID and
    /// broadcasts it back (§4.4). Peers outside `members` never call this
    /// for that group and simply never observe the resulting context.
    #[instrument(skip(self, members), fields(parent = %parent.id()))]
    pub async fn create_context(&self, members: Vec<VAddr>, parent: &Context) -> Result<Context, CageError> {
        let mut sorted = members;
        sorted.sort_unstable();
        sorted.dedup();
        let coordinator = *sorted.first().ok_or(ProtocolError::InvalidContext(parent.id().0))?;

        if !sorted.contains(&self.vaddr) {
            return Ok(Context::invalid(parent.id()));
        }

        if self.vaddr == coordinator {
            let mut received = Vec::new();
            for &member in &sorted {
                if member == self.vaddr {
                    continue;
                }
                let payload_bytes = self
                    .async_recv(member, CONTEXT_BUILD_TAG, parent.id())
                    .await
                    .wait()
                    .await?;
                let mut buf = payload_bytes.as_slice();
                let join = ContextInitPayload::decode(&mut buf)
                    .map_err(|_| ProtocolError::HeaderTooShort { expected: 4, actual: 0 })?;
                received.push(join.members);
            }
            debug_assert!(received.iter().all(|m| *m == sorted));

            let new_id = self.allocate_context_id(coordinator);
            for &member in &sorted {
                if member == self.vaddr {
                    continue;
                }
                let broadcast = ContextInitPayload {
                    context_id: new_id.0,
                    members: sorted.clone(),
                };
                let mut body = BytesMut::new();
                broadcast.encode(&mut body).expect("encoding to BytesMut is infallible");
                self.async_send_message(member, CONTEXT_BUILD_TAG, parent.id(), Message::ContextInit(broadcast))
                    .await?;
            }
            Ok(Context::new(new_id, sorted))
        } else {
            let join = ContextInitPayload {
                context_id: 0,
                members: sorted.clone(),
            };
            self.async_send_message(coordinator, CONTEXT_BUILD_TAG, parent.id(), Message::ContextInit(join))
                .await?;

            let payload_bytes = self
                .async_recv(coordinator, CONTEXT_BUILD_TAG, parent.id())
                .await
                .wait()
                .await?;
            let mut buf = payload_bytes.as_slice();
            let result = ContextInitPayload::decode(&mut buf)
                .map_err(|_| ProtocolError::HeaderTooShort { expected: 4, actual: 0 })?;
            Ok(Context::new(ContextId(result.context_id), result.members))
        }
    }

    /// Collective: partitions `parent` into two halves by rank parity and
    /// negotiates a fresh context ID for this peer's half via the same
    /// handshake [`Transport::create_context`] uses, but framed as
    /// [`Message::Split`] over the control channel (§4.2) to keep it off the
    /// data-plane connection application traffic uses.
    #[instrument(skip(self), fields(parent = %parent.id()))]
    pub async fn split_context(&self, parent: &Context) -> Result<Context, CageError> {
        let my_rank = parent
            .rank_of(self.vaddr)
            .ok_or(ProtocolError::InvalidContext(parent.id().0))?;
        let half: Vec<VAddr> = parent
            .members()
            .iter()
            .enumerate()
            .filter(|(rank, _)| rank % 2 == my_rank % 2)
            .map(|(_, &v)| v)
            .collect();

        let mut sorted = half;
        sorted.sort_unstable();
        let coordinator = sorted[0];

        if self.vaddr == coordinator {
            let mut received = Vec::new();
            for &member in &sorted {
                if member == self.vaddr {
                    continue;
                }
                let bytes = self
                    .async_recv(member, CONTEXT_BUILD_TAG, parent.id())
                    .await
                    .wait()
                    .await?;
                let mut buf = bytes.as_slice();
                let join = SplitPayload::decode(&mut buf)
                    .map_err(|_| ProtocolError::HeaderTooShort { expected: 4, actual: 0 })?;
                received.push(join.members);
            }
            debug_assert!(received.iter().all(|m| *m == sorted));

            let new_id = self.allocate_context_id(coordinator);
            for &member in &sorted {
                if member == self.vaddr {
                    continue;
                }
                let broadcast = SplitPayload {
                    new_context_id: new_id.0,
                    members: sorted.clone(),
                };
                self.async_send_control_message(member, CONTEXT_BUILD_TAG, parent.id(), Message::Split(broadcast))
                    .await?;
            }
            Ok(Context::new(new_id, sorted))
        } else {
            let join = SplitPayload {
                new_context_id: 0,
                members: sorted.clone(),
            };
            self.async_send_control_message(coordinator, CONTEXT_BUILD_TAG, parent.id(), Message::Split(join))
                .await?;

            let bytes = self
                .async_recv(coordinator, CONTEXT_BUILD_TAG, parent.id())
                .await
                .wait()
                .await?;
            let mut buf = bytes.as_slice();
            let result = SplitPayload::decode(&mut buf)
                .map_err(|_| ProtocolError::HeaderTooShort { expected: 4, actual: 0 })?;
            Ok(Context::new(ContextId(result.new_context_id), result.members))
        }
    }

    async fn async_send_message(
        &self,
        dest: VAddr,
        tag: Tag,
        context: ContextId,
        message: Message,
    ) -> Result<(), CageError> {
        self.send_via_pool(&self.data_pool, dest, tag, context, message).await
    }

    /// Like [`Transport::async_send_message`], but over `control_pool` — the
    /// dedicated connection `Destruct` already uses (§4.2), reserved for
    /// `Split` too so a split negotiation never queues behind in-flight
    /// application data on the data-plane connection.
    async fn async_send_control_message(
        &self,
        dest: VAddr,
        tag: Tag,
        context: ContextId,
        message: Message,
    ) -> Result<(), CageError> {
        self.send_via_pool(&self.control_pool, dest, tag, context, message).await
    }

    async fn send_via_pool(
        &self,
        pool: &socket_pool::PushPool,
        dest: VAddr,
        tag: Tag,
        context: ContextId,
        message: Message,
    ) -> Result<(), CageError> {
        match tokio::time::timeout(self.send_timeout, pool.send(dest, tag, context, message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(dest)) => Err(CageError::Transport(TransportFailure::PeerGone(dest.value()))),
            Err(_) => Err(CageError::Transport(TransportFailure::Timeout(self.send_timeout))),
        }
    }

    /// Mutual teardown (§4.4): sends `Destruct` on the control channel to
    /// every initial-context peer and waits until each has sent its own.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let peers: Vec<VAddr> = self
            .initial_context
            .members()
            .iter()
            .copied()
            .filter(|&v| v != self.vaddr)
            .collect();

        for &peer in &peers {
            let _ = self.control_pool.send(peer, Tag(0), self.initial_context.id(), Message::Destruct).await;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(dispatcher::Request::AwaitShutdown {
                expect: peers,
                reply: reply_tx,
            })
            .await;
        let _ = tokio::time::timeout(self.recv_timeout, reply_rx).await;
        info!("transport shutdown complete");
    }

    pub fn signaling_addr(&self) -> std::net::SocketAddr {
        self.signaling_addr
    }

    pub fn peer_endpoint(&self, peer: VAddr) -> Option<std::net::SocketAddr> {
        self.peer_endpoints.get(&peer).copied()
    }
}
