//! [`tokio_util::codec`] adapter wiring [`Message`] onto a [`Framed`](tokio_util::codec::Framed)
//! stream, the way the teacher's `protocol::message` wires its own message
//! enum onto the wire.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::constants::{HEADER_LEN, MAX_FRAME_LEN};
use super::{Message, MessageHeader};
use crate::error::ProtocolError;

/// Stateless framer: decodes `header || body` into a [`Message`] plus its
/// [`MessageHeader`], and encodes the same pair back onto the wire.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = (MessageHeader, Message);
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut peek = &src[..HEADER_LEN];
        let header = MessageHeader::decode(&mut peek)?;
        let frame_len = HEADER_LEN + header.payload_len as usize;

        if header.payload_len as usize > MAX_FRAME_LEN {
            return Err(ProtocolError::HeaderTooShort {
                expected: MAX_FRAME_LEN,
                actual: header.payload_len as usize,
            });
        }
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_LEN);
        let message = Message::decode_body(header.message_type, &mut frame)?;
        Ok(Some((header, message)))
    }
}

impl Encoder<(MessageHeader, Message)> for MessageCodec {
    type Error = ProtocolError;

    fn encode(
        &mut self,
        (header, message): (MessageHeader, Message),
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        dst.reserve(HEADER_LEN + header.payload_len as usize);
        header.encode(dst);
        message.encode_body(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::vaddr::{ContextId, Tag, VAddr};

    fn header_for(message: &Message) -> MessageHeader {
        let mut body = BytesMut::new();
        message.encode_body(&mut body);
        MessageHeader {
            message_type: message.message_type(),
            source: VAddr(1),
            dest: VAddr(2),
            context: ContextId(0),
            tag: Tag(5),
            message_id: 1,
            payload_len: body.len() as u64,
        }
    }

    #[test]
    fn encodes_then_decodes_a_data_frame() {
        let mut codec = MessageCodec;
        let message = Message::Data(vec![9, 9, 9]);
        let header = header_for(&message);

        let mut buf = BytesMut::new();
        codec.encode((header, message.clone()), &mut buf).unwrap();

        let (decoded_header, decoded_message) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(decoded_message, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_until_full_frame_arrives() {
        let mut codec = MessageCodec;
        let message = Message::Data(vec![1, 2, 3, 4, 5]);
        let header = header_for(&message);

        let mut full = BytesMut::new();
        codec.encode((header, message), &mut full).unwrap();

        let mut partial = full.split_to(HEADER_LEN + 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(full);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn rejects_oversized_payload_length() {
        let mut codec = MessageCodec;
        let header = MessageHeader {
            message_type: super::super::constants::DATA_TYPE,
            source: VAddr(0),
            dest: VAddr(0),
            context: ContextId(0),
            tag: Tag(0),
            message_id: 0,
            payload_len: (MAX_FRAME_LEN as u64) + 1,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_matches!(err, ProtocolError::HeaderTooShort { .. });
    }
}
