//! The `Substrate` trait (§4.9, §9 redesign flags): decouples the graph
//! overlay from a specific transport so `Cage<S, G>` can run against the
//! socket-backed [`Transport`](crate::transport::Transport) in production
//! and against a fake in tests.

use async_trait::async_trait;

use crate::error::{CageError, TransportFailure};
use crate::transport::{Context, Event};
use crate::vaddr::{ContextId, Tag, VAddr};

/// Everything the graph overlay and collective engine need from a
/// transport. `async_send`/`async_recv` are immediate-return, `Event`-based
/// primitives; `recv` and the context operations are the blocking/async
/// forms that wait for completion.
#[async_trait]
pub trait Substrate: Send + Sync {
    fn vaddr(&self) -> VAddr;
    fn initial_context(&self) -> &Context;

    async fn async_send(&self, dst: VAddr, tag: Tag, context: ContextId, bytes: Vec<u8>) -> Event<()>;
    async fn async_recv(&self, src: VAddr, tag: Tag, context: ContextId) -> Event<Vec<u8>>;
    async fn recv(&self, context: ContextId) -> Result<(VAddr, Tag, Vec<u8>), TransportFailure>;

    async fn create_context(&self, members: Vec<VAddr>, parent: &Context) -> Result<Context, CageError>;
    async fn split_context(&self, parent: &Context) -> Result<Context, CageError>;

    async fn shutdown(&self);
}

#[async_trait]
impl Substrate for crate::transport::Transport {
    fn vaddr(&self) -> VAddr {
        crate::transport::Transport::vaddr(self)
    }

    fn initial_context(&self) -> &Context {
        crate::transport::Transport::initial_context(self)
    }

    async fn async_send(&self, dst: VAddr, tag: Tag, context: ContextId, bytes: Vec<u8>) -> Event<()> {
        crate::transport::Transport::async_send(self, dst, tag, context, bytes).await
    }

    async fn async_recv(&self, src: VAddr, tag: Tag, context: ContextId) -> Event<Vec<u8>> {
        crate::transport::Transport::async_recv(self, src, tag, context).await
    }

    async fn recv(&self, context: ContextId) -> Result<(VAddr, Tag, Vec<u8>), TransportFailure> {
        crate::transport::Transport::recv(self, context).await
    }

    async fn create_context(&self, members: Vec<VAddr>, parent: &Context) -> Result<Context, CageError> {
        crate::transport::Transport::create_context(self, members, parent).await
    }

    async fn split_context(&self, parent: &Context) -> Result<Context, CageError> {
        crate::transport::Transport::split_context(self, parent).await
    }

    async fn shutdown(&self) {
        crate::transport::Transport::shutdown(self).await
    }
}
