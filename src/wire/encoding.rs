use prost::{bytes::BufMut, Message};

use super::{
    proto::{envelope, Envelope, UpdateRejectedMsg},
    BytesBus, MessageBus, WireError,
};
use crate::messages::{ConversionError, PeerMessage};
use tracing::trace;

/// Size of the length prefix of every frame.
const HEADER_LEN: usize = 2;

/// Frames are the protobuf encoded [Envelope], prefixed with its length as a
/// big-endian `u16`.
#[derive(Debug)]
pub struct ProtoBufEncodingLayer<B: BytesBus> {
    pub bus: B,
}

impl From<PeerMessage> for envelope::Msg {
    fn from(msg: PeerMessage) -> Self {
        match msg {
            PeerMessage::Update(msg) => envelope::Msg::Update(msg.into()),
            PeerMessage::UpdateAccepted(msg) => envelope::Msg::UpdateAccepted(msg.into()),
            PeerMessage::UpdateRejected {
                channel_id,
                seqno_a,
                seqno_b,
                reason,
            } => envelope::Msg::UpdateRejected(UpdateRejectedMsg {
                channel_id: crate::messages::u256_to_wire(channel_id),
                seqno_a,
                seqno_b,
                reason,
            }),
            PeerMessage::CloseRequest(msg) => envelope::Msg::CloseRequest(msg.into()),
            PeerMessage::CloseAccepted(msg) => envelope::Msg::CloseAccepted(msg.into()),
        }
    }
}

impl TryFrom<Envelope> for PeerMessage {
    type Error = ConversionError;

    fn try_from(value: Envelope) -> Result<Self, Self::Error> {
        Ok(match value.msg.ok_or(ConversionError::EmptyEnvelope)? {
            envelope::Msg::Update(msg) => PeerMessage::Update(msg.try_into()?),
            envelope::Msg::UpdateAccepted(msg) => PeerMessage::UpdateAccepted(msg.try_into()?),
            envelope::Msg::UpdateRejected(msg) => PeerMessage::UpdateRejected {
                channel_id: crate::messages::u256_from_wire(&msg.channel_id)?,
                seqno_a: msg.seqno_a,
                seqno_b: msg.seqno_b,
                reason: msg.reason,
            },
            envelope::Msg::CloseRequest(msg) => PeerMessage::CloseRequest(msg.try_into()?),
            envelope::Msg::CloseAccepted(msg) => PeerMessage::CloseAccepted(msg.try_into()?),
        })
    }
}

impl<B: BytesBus> ProtoBufEncodingLayer<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn encode(msg: PeerMessage) -> Result<Vec<u8>, WireError> {
        let envelope = Envelope {
            msg: Some(msg.into()),
        };
        let len = envelope.encoded_len();
        let prefix = u16::try_from(len).map_err(|_| WireError::FrameTooLarge(len))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + len);
        buf.put_slice(&prefix.to_be_bytes());
        envelope.encode(&mut buf)?;
        Ok(buf)
    }

    /// Parse one complete frame.
    pub fn decode(frame: &[u8]) -> Result<PeerMessage, WireError> {
        if frame.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                expected: HEADER_LEN,
                got: frame.len(),
            });
        }
        let (header, body) = frame.split_at(HEADER_LEN);
        let len = u16::from_be_bytes([header[0], header[1]]) as usize;
        if body.len() < len {
            return Err(WireError::Truncated {
                expected: len,
                got: body.len(),
            });
        }
        if body.len() > len {
            return Err(WireError::TrailingBytes(body.len() - len));
        }

        let envelope = Envelope::decode(body)?;
        Ok(envelope.try_into()?)
    }
}

impl<B: BytesBus> MessageBus for ProtoBufEncodingLayer<B> {
    fn send_to_peer(&self, msg: PeerMessage) -> Result<(), WireError> {
        let frame = Self::encode(msg)?;
        trace!(len = frame.len(), "sending frame");
        self.bus.send_to_peer(&frame);
        Ok(())
    }
}
