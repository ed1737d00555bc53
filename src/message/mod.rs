//! The wire format: a fixed [`MessageHeader`] followed by a type-tagged
//! [`Message`] body. Every frame on both the data-plane socket pool and the
//! signaling connection uses this same shape, following the teacher's
//! `protocol::message` layout of a small header struct plus an enum of typed
//! bodies.

pub mod codec;
pub mod constants;
pub mod payload;

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;
use crate::vaddr::{ContextId, Tag, VAddr};
use constants::*;
use payload::{
    Codec, ConfirmPayload, ContextInitPayload, ContextRequestPayload, PeerPayload,
    SplitPayload, VAddrLookupPayload, VAddrRequestPayload,
};

/// The 32-byte frame prefix: message type, routing, and payload length.
///
/// Layout (all integers little-endian):
///
/// | offset | len | field        |
/// |--------|-----|--------------|
/// | 0      | 1   | message type |
/// | 1      | 3   | reserved     |
/// | 4      | 4   | source vaddr |
/// | 8      | 4   | dest vaddr   |
/// | 12     | 4   | context id   |
/// | 16     | 4   | tag          |
/// | 20     | 4   | message id   |
/// | 24     | 8   | payload len  |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: u8,
    pub source: VAddr,
    pub dest: VAddr,
    pub context: ContextId,
    pub tag: Tag,
    pub message_id: u32,
    pub payload_len: u64,
}

impl MessageHeader {
    pub fn encode<B: BufMut>(&self, buffer: &mut B) {
        buffer.put_u8(self.message_type);
        buffer.put_slice(&[0u8; 3]);
        buffer.put_u32_le(self.source.0);
        buffer.put_u32_le(self.dest.0);
        buffer.put_u32_le(self.context.0);
        buffer.put_u32_le(self.tag.0);
        buffer.put_u32_le(self.message_id);
        buffer.put_u64_le(self.payload_len);
    }

    pub fn decode<B: Buf>(bytes: &mut B) -> Result<Self, ProtocolError> {
        if bytes.remaining() < HEADER_LEN {
            return Err(ProtocolError::HeaderTooShort {
                expected: HEADER_LEN,
                actual: bytes.remaining(),
            });
        }
        let message_type = bytes.get_u8();
        bytes.advance(3);
        let source = VAddr(bytes.get_u32_le());
        let dest = VAddr(bytes.get_u32_le());
        let context = ContextId(bytes.get_u32_le());
        let tag = Tag(bytes.get_u32_le());
        let message_id = bytes.get_u32_le();
        let payload_len = bytes.get_u64_le();

        if payload_len as usize > MAX_FRAME_LEN {
            return Err(ProtocolError::HeaderTooShort {
                expected: MAX_FRAME_LEN,
                actual: payload_len as usize,
            });
        }

        Ok(Self {
            message_type,
            source,
            dest,
            context,
            tag,
            message_id,
            payload_len,
        })
    }
}

/// A fully decoded frame body. Control variants carry the signaling and
/// context-management protocol; [`Message::Data`] is opaque application
/// payload routed by the transport's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Data(Vec<u8>),
    VAddrRequest(VAddrRequestPayload),
    VAddrLookup(VAddrLookupPayload),
    ContextInit(ContextInitPayload),
    ContextRequest(ContextRequestPayload),
    Peer(PeerPayload),
    Confirm(ConfirmPayload),
    Split(SplitPayload),
    Ack,
    Retry,
    Destruct,
}

impl Message {
    pub fn message_type(&self) -> u8 {
        match self {
            Message::Data(_) => DATA_TYPE,
            Message::VAddrRequest(_) => VADDR_REQUEST_TYPE,
            Message::VAddrLookup(_) => VADDR_LOOKUP_TYPE,
            Message::ContextInit(_) => CONTEXT_INIT_TYPE,
            Message::ContextRequest(_) => CONTEXT_REQUEST_TYPE,
            Message::Peer(_) => PEER_TYPE,
            Message::Confirm(_) => CONFIRM_TYPE,
            Message::Split(_) => SPLIT_TYPE,
            Message::Ack => ACK_TYPE,
            Message::Retry => RETRY_TYPE,
            Message::Destruct => DESTRUCT_TYPE,
        }
    }

    pub fn encode_body<B: BufMut>(&self, buffer: &mut B) {
        match self {
            Message::Data(bytes) => buffer.put_slice(bytes),
            Message::VAddrRequest(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::VAddrLookup(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::ContextInit(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::ContextRequest(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::Peer(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::Confirm(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::Split(p) => p.encode(buffer).expect("encoding to BufMut is infallible"),
            Message::Ack | Message::Retry | Message::Destruct => {}
        }
    }

    pub fn decode_body<B: Buf>(message_type: u8, bytes: &mut B) -> Result<Self, ProtocolError> {
        Ok(match message_type {
            DATA_TYPE => Message::Data(bytes.copy_to_bytes(bytes.remaining()).to_vec()),
            VADDR_REQUEST_TYPE => Message::VAddrRequest(VAddrRequestPayload::decode(bytes)?),
            VADDR_LOOKUP_TYPE => Message::VAddrLookup(VAddrLookupPayload::decode(bytes)?),
            CONTEXT_INIT_TYPE => Message::ContextInit(ContextInitPayload::decode(bytes)?),
            CONTEXT_REQUEST_TYPE => Message::ContextRequest(ContextRequestPayload::decode(bytes)?),
            PEER_TYPE => Message::Peer(PeerPayload::decode(bytes)?),
            CONFIRM_TYPE => Message::Confirm(ConfirmPayload::decode(bytes)?),
            SPLIT_TYPE => Message::Split(SplitPayload::decode(bytes)?),
            ACK_TYPE => Message::Ack,
            RETRY_TYPE => Message::Retry,
            DESTRUCT_TYPE => Message::Destruct,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn header_roundtrips() {
        let header = MessageHeader {
            message_type: DATA_TYPE,
            source: VAddr(3),
            dest: VAddr(9),
            context: ContextId(0),
            tag: Tag(42),
            message_id: 7,
            payload_len: 128,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        let decoded = MessageHeader::decode(&mut buf).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn header_rejects_short_buffer() {
        let mut buf = BytesMut::from(&[0u8; 4][..]);
        let err = MessageHeader::decode(&mut buf).unwrap_err();
        assert_matches!(err, ProtocolError::HeaderTooShort { .. });
    }

    #[test]
    fn data_message_roundtrips_through_body_codec() {
        let message = Message::Data(vec![1, 2, 3, 4]);
        let mut buf = BytesMut::new();
        message.encode_body(&mut buf);
        let decoded = Message::decode_body(DATA_TYPE, &mut buf).unwrap();
        assert_eq!(message, decoded);
    }

    #[test]
    fn ack_has_empty_body() {
        let mut buf = BytesMut::new();
        Message::Ack.encode_body(&mut buf);
        assert!(buf.is_empty());
        assert_eq!(Message::decode_body(ACK_TYPE, &mut buf).unwrap(), Message::Ack);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let mut buf = BytesMut::new();
        let err = Message::decode_body(250, &mut buf).unwrap_err();
        assert_matches!(err, ProtocolError::UnknownMessageType(250));
    }
}
