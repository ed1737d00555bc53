//! Turns one decoded request [`Message`] into one reply, per §4.1. Shared
//! between the standalone binary and the in-process `testutil` server so
//! both observe identical behaviour.

use tracing::debug;

use crate::error::ProtocolError;
use crate::message::Message;

use super::registry::Registry;

/// Handles a single signaling request and produces the reply to frame back.
///
/// Any non-signaling message type (`Data`, `Split`, `Ack`, `Destruct`, …) is
/// a protocol violation on this connection and is rejected outright; the
/// signaling server only ever speaks the three request/reply pairs named in
/// §4.1.
pub fn handle(registry: &Registry, request: Message) -> Result<Message, ProtocolError> {
    match request {
        Message::VAddrRequest(req) => {
            let vaddr = registry
                .request_vaddr(req.endpoint_uri, req.context_size_hint as usize, req.context_name)
                .map_err(|_| ProtocolError::InvalidContext(0))?;
            debug!(%vaddr, "assigned vaddr");
            Ok(Message::Confirm(crate::message::payload::ConfirmPayload { vaddr }))
        }
        Message::VAddrLookup(req) => match registry.lookup(req.vaddr) {
            Some(endpoint_uri) => Ok(Message::Peer(crate::message::payload::PeerPayload {
                endpoint_uri,
            })),
            None => Ok(Message::Retry),
        },
        Message::ContextRequest(req) => match registry.context(&req.context_name) {
            Some((context_id, members)) => {
                Ok(Message::ContextInit(crate::message::payload::ContextInitPayload {
                    context_id: context_id.0,
                    members,
                }))
            }
            None => Ok(Message::Retry),
        },
        other => Err(ProtocolError::UnknownMessageType(other.message_type())),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::message::payload::{ContextRequestPayload, VAddrLookupPayload, VAddrRequestPayload};
    use crate::vaddr::VAddr;

    #[test]
    fn vaddr_request_assigns_and_confirms() {
        let registry = Registry::new();
        let reply = handle(
            &registry,
            Message::VAddrRequest(VAddrRequestPayload {
                endpoint_uri: "tcp://127.0.0.1:9000".into(),
                context_size_hint: 1,
                context_name: "demo".into(),
            }),
        )
        .unwrap();
        assert_eq!(
            reply,
            Message::Confirm(crate::message::payload::ConfirmPayload { vaddr: VAddr(0) })
        );
    }

    #[test]
    fn lookup_of_unknown_vaddr_replies_retry() {
        let registry = Registry::new();
        let reply = handle(
            &registry,
            Message::VAddrLookup(VAddrLookupPayload { vaddr: VAddr(9) }),
        )
        .unwrap();
        assert_eq!(reply, Message::Retry);
    }

    #[test]
    fn context_request_before_full_membership_replies_retry() {
        let registry = Registry::new();
        registry
            .request_vaddr("tcp://a".into(), 2, "demo".into())
            .unwrap();
        let reply = handle(
            &registry,
            Message::ContextRequest(ContextRequestPayload {
                context_name: "demo".into(),
            }),
        )
        .unwrap();
        assert_eq!(reply, Message::Retry);
    }

    #[test]
    fn data_message_is_rejected() {
        let registry = Registry::new();
        let err = handle(&registry, Message::Data(vec![1])).unwrap_err();
        assert_matches!(err, ProtocolError::UnknownMessageType(_));
    }
}
