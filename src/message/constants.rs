//! Wire constants for the message header (see [`super::MessageHeader`]).

/// Size, in bytes, of the fixed header that prefixes every frame.
pub const HEADER_LEN: usize = 32;

pub const DATA_TYPE: u8 = 0;
pub const VADDR_REQUEST_TYPE: u8 = 1;
pub const VADDR_LOOKUP_TYPE: u8 = 2;
pub const CONTEXT_INIT_TYPE: u8 = 3;
pub const CONTEXT_REQUEST_TYPE: u8 = 4;
pub const PEER_TYPE: u8 = 5;
pub const CONFIRM_TYPE: u8 = 6;
pub const SPLIT_TYPE: u8 = 7;
pub const ACK_TYPE: u8 = 8;
pub const RETRY_TYPE: u8 = 9;
pub const DESTRUCT_TYPE: u8 = 10;

/// Largest frame (header + payload) the codec will accept before treating the
/// stream as corrupt. Generous, since payloads are caller-defined byte
/// buffers, but still bounds the allocation a malformed length field can
/// trigger.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
