//! Per-peer push sockets and the unified pull listener (§4.2).
//!
//! Every push connection is fed by a dedicated bounded `mpsc` channel: the
//! channel serializes concurrent senders, so no mutex guards the socket
//! itself ("the channel *is* the mutex"). Each accepted pull/control
//! connection feeds the same internal channel the dispatcher drains.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::message::codec::MessageCodec;
use crate::message::{Message, MessageHeader};
use crate::vaddr::{ContextId, Tag, VAddr};

use super::dispatcher::Incoming;

const PUSH_CHANNEL_CAPACITY: usize = 256;

/// Binds `preferred` and, on "address in use", increments the port and
/// retries (§4.2, mirroring the reference ZMQ-backed prototype).
pub async fn bind_with_increment(preferred: SocketAddr) -> std::io::Result<(TcpListener, SocketAddr)> {
    let mut addr = preferred;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let bound = listener.local_addr()?;
                return Ok((listener, bound));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                addr.set_port(addr.port() + 1);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Accepts connections on `listener` forever, forwarding every decoded frame
/// to `incoming_tx`. Used for both the pull listener and the control
/// listener; the dispatcher tells the two apart by message variant, not by
/// which socket they arrived on.
pub async fn accept_loop(listener: TcpListener, incoming_tx: mpsc::Sender<Incoming>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "accept failed, stopping listener");
                return;
            }
        };
        let incoming_tx = incoming_tx.clone();
        tokio::spawn(async move {
            let mut framed = Framed::new(stream, MessageCodec);
            while let Some(frame) = framed.next().await {
                match frame {
                    Ok((header, message)) => {
                        if incoming_tx.send(Incoming { header, message }).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(%peer_addr, %err, "malformed frame, dropping connection");
                        return;
                    }
                }
            }
            debug!(%peer_addr, "pull connection closed");
        });
    }
}

/// One outgoing frame, already paired with its header.
pub type OutgoingFrame = (MessageHeader, Message);

/// The set of push connections a peer maintains to every other peer it
/// knows about, plus the per-key monotonic message-id counters used to
/// order `Data` deliveries.
pub struct PushPool {
    local: VAddr,
    senders: Mutex<HashMap<VAddr, mpsc::Sender<OutgoingFrame>>>,
    next_message_id: Mutex<HashMap<(VAddr, Tag, ContextId), u32>>,
}

impl PushPool {
    pub fn new(local: VAddr) -> Self {
        Self {
            local,
            senders: Mutex::new(HashMap::new()),
            next_message_id: Mutex::new(HashMap::new()),
        }
    }

    /// Connects a push socket to `peer` at `addr` and spawns its writer
    /// task. Replaces any existing connection to the same peer.
    pub async fn connect(&self, peer: VAddr, addr: SocketAddr) -> std::io::Result<()> {
        let stream = TcpStream::connect(addr).await?;
        let (tx, mut rx) = mpsc::channel::<OutgoingFrame>(PUSH_CHANNEL_CAPACITY);
        self.senders.lock().insert(peer, tx);

        tokio::spawn(async move {
            let mut framed = Framed::new(stream, MessageCodec);
            while let Some((header, message)) = rx.recv().await {
                if let Err(err) = framed.send((header, message)).await {
                    warn!(%peer, %err, "push socket write failed");
                    return;
                }
            }
        });
        Ok(())
    }

    fn next_id(&self, key: (VAddr, Tag, ContextId)) -> u32 {
        let mut table = self.next_message_id.lock();
        let id = table.entry(key).or_insert(0);
        let assigned = *id;
        *id += 1;
        assigned
    }

    /// Frames and enqueues `bytes` as a `Data` message to `dest`. Returns
    /// once the frame is enqueued on the destination's push channel (the
    /// "brief await" permitted for `async_send` by §5).
    pub async fn send_data(
        &self,
        dest: VAddr,
        tag: Tag,
        context: ContextId,
        bytes: Vec<u8>,
    ) -> Result<(), VAddr> {
        self.send(dest, tag, context, Message::Data(bytes)).await
    }

    /// Frames and enqueues any [`Message`] to `dest`'s main push socket.
    pub async fn send(
        &self,
        dest: VAddr,
        tag: Tag,
        context: ContextId,
        message: Message,
    ) -> Result<(), VAddr> {
        let message_id = self.next_id((dest, tag, context));
        let mut body = BytesMut::new();
        message.encode_body(&mut body);
        let header = MessageHeader {
            message_type: message.message_type(),
            source: self.local,
            dest,
            context,
            tag,
            message_id,
            payload_len: body.len() as u64,
        };

        let sender = self.senders.lock().get(&dest).cloned();
        match sender {
            Some(sender) => sender.send((header, message)).await.map_err(|_| dest),
            None => Err(dest),
        }
    }

    pub fn is_connected(&self, peer: VAddr) -> bool {
        self.senders.lock().contains_key(&peer)
    }
}
