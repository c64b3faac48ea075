//! Transport of [PeerMessage]s.
//!
//! The transport itself (connections, authentication, retries) is not part
//! of this crate: it is a [BytesBus] that delivers opaque frames to the peer.
//! [ProtoBufEncodingLayer] turns messages into frames and back.

mod encoding;
pub mod proto;

use core::fmt::Debug;

pub use encoding::ProtoBufEncodingLayer;

use crate::messages::{ConversionError, PeerMessage};

pub trait BytesBus: Debug {
    fn send_to_peer(&self, frame: &[u8]);
}

/// Typed view of the connection to the peer.
pub trait MessageBus: Debug {
    fn send_to_peer(&self, msg: PeerMessage) -> Result<(), WireError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("message of {0} bytes does not fit into a frame")]
    FrameTooLarge(usize),
    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("frame has {0} trailing bytes")]
    TrailingBytes(usize),
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
    #[error(transparent)]
    Encode(#[from] prost::EncodeError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
