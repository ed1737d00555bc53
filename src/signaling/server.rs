//! Accept loop for the signaling server, shared by the `signaling-server`
//! binary and the in-process `testutil` harness.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::message::codec::MessageCodec;
use crate::vaddr::{ContextId, Tag, VAddr};

use super::protocol;
use super::registry::Registry;

/// Binds `addr` and serves the signaling protocol until the process exits.
/// Every accepted connection is handled on its own task; the registry is the
/// only state shared across them.
pub async fn run(addr: SocketAddr, registry: Arc<Registry>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "signaling server listening");
    serve(listener, registry).await
}

/// Accept loop over an already-bound `listener`. Split out from [`run`] so
/// callers that need to know the bound address up front (an ephemeral port,
/// in particular) can bind it themselves first.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, peer_addr, registry).await {
                warn!(%peer_addr, %err, "signaling connection ended with an error");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry>,
) -> std::io::Result<()> {
    let mut framed = Framed::new(stream, MessageCodec);
    debug!(%peer_addr, "signaling connection accepted");

    while let Some(frame) = framed.next().await {
        let (header, request) = match frame {
            Ok(frame) => frame,
            Err(err) => {
                error!(%peer_addr, %err, "malformed signaling frame");
                return Ok(());
            }
        };

        let reply = match protocol::handle(&registry, request) {
            Ok(reply) => reply,
            Err(err) => {
                error!(%peer_addr, %err, "fatal signaling protocol error");
                return Ok(());
            }
        };

        let mut body = bytes::BytesMut::new();
        reply.encode_body(&mut body);
        let reply_header = crate::message::MessageHeader {
            message_type: reply.message_type(),
            source: header.dest,
            dest: header.source,
            context: ContextId(header.context.0),
            tag: Tag(header.tag.0),
            message_id: header.message_id,
            payload_len: body.len() as u64,
        };

        if framed.send((reply_header, reply)).await.is_err() {
            warn!(%peer_addr, "failed to send signaling reply, dropping connection");
            return Ok(());
        }
    }

    debug!(%peer_addr, "signaling connection closed");
    Ok(())
}

/// Placeholder VAddr used to stamp outbound requests before a peer has been
/// assigned one of its own (only the signaling server ever looks at the
/// header's routing fields on these connections, and it ignores them).
pub const UNASSIGNED: VAddr = VAddr(u32::MAX);
