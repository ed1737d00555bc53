//! Control-plane payload types carried inside [`Message`](super::Message) variants.
//!
//! Each payload implements [`Codec`] the same way the core header does: a
//! small, explicit `encode`/`decode` pair over `bytes::BufMut`/`Buf`, with no
//! reliance on an external serialization crate (that policy is out of scope
//! for this crate; see `SPEC_FULL.md` §1).

use bytes::{Buf, BufMut};
use std::io;

use crate::vaddr::VAddr;

/// Shared encode/decode contract for payload types.
pub trait Codec: Sized {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()>;
    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self>;
}

fn encode_str<B: BufMut>(buffer: &mut B, s: &str) -> io::Result<()> {
    buffer.put_u32_le(s.len() as u32);
    buffer.put_slice(s.as_bytes());
    Ok(())
}

fn decode_str<B: Buf>(bytes: &mut B) -> io::Result<String> {
    if bytes.remaining() < 4 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    let len = bytes.get_u32_le() as usize;
    if bytes.remaining() < len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    let mut buf = vec![0u8; len];
    bytes.copy_to_slice(&mut buf);
    String::from_utf8(buf).map_err(|_| io::ErrorKind::InvalidData.into())
}

fn encode_vaddrs<B: BufMut>(buffer: &mut B, vaddrs: &[VAddr]) -> io::Result<()> {
    buffer.put_u32_le(vaddrs.len() as u32);
    for v in vaddrs {
        buffer.put_u32_le(v.0);
    }
    Ok(())
}

fn decode_vaddrs<B: Buf>(bytes: &mut B) -> io::Result<Vec<VAddr>> {
    if bytes.remaining() < 4 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    let len = bytes.get_u32_le() as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        if bytes.remaining() < 4 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        out.push(VAddr(bytes.get_u32_le()));
    }
    Ok(out)
}

/// Sent by a peer to the signaling server to obtain a [`VAddr`] and register
/// its endpoint for the named context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VAddrRequestPayload {
    pub endpoint_uri: String,
    pub context_size_hint: u32,
    pub context_name: String,
}

impl Codec for VAddrRequestPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        encode_str(buffer, &self.endpoint_uri)?;
        buffer.put_u32_le(self.context_size_hint);
        encode_str(buffer, &self.context_name)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let endpoint_uri = decode_str(bytes)?;
        if bytes.remaining() < 4 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let context_size_hint = bytes.get_u32_le();
        let context_name = decode_str(bytes)?;
        Ok(Self {
            endpoint_uri,
            context_size_hint,
            context_name,
        })
    }
}

/// Sent to the signaling server to resolve a [`VAddr`] to its endpoint URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VAddrLookupPayload {
    pub vaddr: VAddr,
}

impl Codec for VAddrLookupPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_u32_le(self.vaddr.0);
        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        if bytes.remaining() < 4 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(Self {
            vaddr: VAddr(bytes.get_u32_le()),
        })
    }
}

/// Sent to the signaling server to wait for / retrieve a named context's
/// membership, and used between transport peers both to announce readiness
/// to a coordinator and to broadcast the finished context back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInitPayload {
    pub context_id: u32,
    pub members: Vec<VAddr>,
}

impl Codec for ContextInitPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_u32_le(self.context_id);
        encode_vaddrs(buffer, &self.members)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        if bytes.remaining() < 4 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let context_id = bytes.get_u32_le();
        let members = decode_vaddrs(bytes)?;
        Ok(Self {
            context_id,
            members,
        })
    }
}

/// Sent to the signaling server to resolve a named context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequestPayload {
    pub context_name: String,
}

impl Codec for ContextRequestPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        encode_str(buffer, &self.context_name)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        Ok(Self {
            context_name: decode_str(bytes)?,
        })
    }
}

/// Reply to [`VAddrLookupPayload`] carrying the resolved endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPayload {
    pub endpoint_uri: String,
}

impl Codec for PeerPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        encode_str(buffer, &self.endpoint_uri)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        Ok(Self {
            endpoint_uri: decode_str(bytes)?,
        })
    }
}

/// Reply to [`VAddrRequestPayload`] carrying the assigned [`VAddr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPayload {
    pub vaddr: VAddr,
}

impl Codec for ConfirmPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_u32_le(self.vaddr.0);
        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        if bytes.remaining() < 4 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(Self {
            vaddr: VAddr(bytes.get_u32_le()),
        })
    }
}

/// Broadcast by a split coordinator to each member of a newly created half
/// context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPayload {
    pub new_context_id: u32,
    pub members: Vec<VAddr>,
}

impl Codec for SplitPayload {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_u32_le(self.new_context_id);
        encode_vaddrs(buffer, &self.members)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        if bytes.remaining() < 4 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let new_context_id = bytes.get_u32_le();
        let members = decode_vaddrs(bytes)?;
        Ok(Self {
            new_context_id,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip<T: Codec + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = BytesMut::new();
        value.encode(&mut buf).unwrap();
        let decoded = T::decode(&mut buf).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn vaddr_request_roundtrips() {
        roundtrip(VAddrRequestPayload {
            endpoint_uri: "tcp://127.0.0.1:9000".to_string(),
            context_size_hint: 4,
            context_name: "chain-demo".to_string(),
        });
    }

    #[test]
    fn context_init_roundtrips() {
        roundtrip(ContextInitPayload {
            context_id: 7,
            members: vec![VAddr(0), VAddr(1), VAddr(2)],
        });
    }

    #[test]
    fn split_roundtrips() {
        roundtrip(SplitPayload {
            new_context_id: 9,
            members: vec![VAddr(1), VAddr(3)],
        });
    }
}
