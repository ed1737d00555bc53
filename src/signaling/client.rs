//! What a peer's transport speaks against the signaling server: one
//! connection per request, following the request/reply shape of §4.1.
//! `lookup_peer` and `request_context` poll on `Retry` with a fixed backoff,
//! which is how a late-arriving peer discovers one that registered earlier
//! (§8 scenario 6, "late arrival").

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::{ProtocolError, TransportFailure};
use crate::message::codec::MessageCodec;
use crate::message::payload::{
    ContextRequestPayload, VAddrLookupPayload, VAddrRequestPayload,
};
use crate::message::{Message, MessageHeader};
use crate::vaddr::{ContextId, Tag, VAddr};

use super::server::UNASSIGNED;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

async fn roundtrip(addr: SocketAddr, request: Message) -> Result<Message, ProtocolError> {
    let stream = TcpStream::connect(addr).await?;
    let mut framed = Framed::new(stream, MessageCodec);

    let mut body = BytesMut::new();
    request.encode_body(&mut body);
    let header = MessageHeader {
        message_type: request.message_type(),
        source: UNASSIGNED,
        dest: UNASSIGNED,
        context: ContextId(0),
        tag: Tag(0),
        message_id: 0,
        payload_len: body.len() as u64,
    };

    framed.send((header, request)).await?;
    let (_, reply) = framed
        .next()
        .await
        .ok_or(ProtocolError::HeaderTooShort { expected: 32, actual: 0 })??;
    Ok(reply)
}

/// Registers this peer's endpoint and obtains its [`VAddr`].
pub async fn request_vaddr(
    signaling_addr: SocketAddr,
    endpoint_uri: &str,
    context_size: usize,
    context_name: &str,
) -> Result<VAddr, ProtocolError> {
    let request = Message::VAddrRequest(VAddrRequestPayload {
        endpoint_uri: endpoint_uri.to_string(),
        context_size_hint: context_size as u32,
        context_name: context_name.to_string(),
    });
    match roundtrip(signaling_addr, request).await? {
        Message::Confirm(confirm) => Ok(confirm.vaddr),
        other => Err(ProtocolError::UnknownMessageType(other.message_type())),
    }
}

/// Resolves `vaddr`'s endpoint, polling on `Retry` until it has registered
/// or `deadline` elapses.
pub async fn lookup_peer(
    signaling_addr: SocketAddr,
    vaddr: VAddr,
    deadline: Duration,
) -> Result<String, TransportFailure> {
    let start = tokio::time::Instant::now();
    loop {
        let request = Message::VAddrLookup(VAddrLookupPayload { vaddr });
        let reply = roundtrip(signaling_addr, request)
            .await
            .map_err(|_| TransportFailure::Cancelled)?;
        match reply {
            Message::Peer(peer) => return Ok(peer.endpoint_uri),
            Message::Retry => {
                if start.elapsed() >= deadline {
                    return Err(TransportFailure::Timeout(deadline));
                }
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            _ => return Err(TransportFailure::Cancelled),
        }
    }
}

/// Resolves the named context's full membership, polling on `Retry` until
/// every expected peer has registered or `deadline` elapses.
pub async fn request_context(
    signaling_addr: SocketAddr,
    context_name: &str,
    deadline: Duration,
) -> Result<(ContextId, Vec<VAddr>), TransportFailure> {
    let start = tokio::time::Instant::now();
    loop {
        let request = Message::ContextRequest(ContextRequestPayload {
            context_name: context_name.to_string(),
        });
        let reply = roundtrip(signaling_addr, request)
            .await
            .map_err(|_| TransportFailure::Cancelled)?;
        match reply {
            Message::ContextInit(init) => {
                return Ok((ContextId(init.context_id), init.members));
            }
            Message::Retry => {
                if start.elapsed() >= deadline {
                    return Err(TransportFailure::Timeout(deadline));
                }
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            _ => return Err(TransportFailure::Cancelled),
        }
    }
}
