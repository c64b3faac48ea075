//! Messages exchanged between the two parties of a channel, and how a
//! [Channel] reacts to them.

mod close;
mod update;

use crate::{
    channel::{Channel, ChannelError, ChannelState, CloseRequest, CooperativeClose, Party, SignedState},
    encoding::types::{u256_from_bytes, u256_to_bytes},
    Signature, U256,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("required field is missing")]
    ExpectedSome,
    #[error("field has the wrong length")]
    ByteLengthMismatch,
    #[error("unknown party {0}")]
    UnknownParty(u32),
    #[error("envelope without message")]
    EmptyEnvelope,
}

/// Messages sent between the two parties of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// A proposed transfer, signed by the proposer.
    Update(SignedState),
    /// The countersignature for a proposal.
    UpdateAccepted(SignedState),
    UpdateRejected {
        channel_id: U256,
        seqno_a: u64,
        seqno_b: u64,
        reason: String,
    },
    CloseRequest(CloseRequest),
    /// Reply to a close request: the state with both close signatures.
    CloseAccepted(CooperativeClose),
}

impl PeerMessage {
    /// Rejection of the proposal `state`, to be sent when
    /// [handle] fails for an [PeerMessage::Update].
    pub fn rejection(state: &ChannelState, reason: &ChannelError) -> Self {
        let (seqno_a, seqno_b) = state.seqno_pair();
        PeerMessage::UpdateRejected {
            channel_id: state.channel_id(),
            seqno_a,
            seqno_b,
            reason: reason.to_string(),
        }
    }
}

/// Apply a message of the peer to `channel` and return the reply to send, if
/// any.
///
/// A [PeerMessage::CloseAccepted] is only checked; submitting it is up to the
/// caller.
pub fn handle(channel: &mut Channel, msg: &PeerMessage) -> Result<Option<PeerMessage>, ChannelError> {
    match msg {
        PeerMessage::Update(proposal) => {
            let sig = channel.verify_and_cosign(proposal)?;
            Ok(Some(PeerMessage::UpdateAccepted(SignedState {
                state: proposal.state,
                signer: channel.party(),
                sig,
            })))
        }
        PeerMessage::UpdateAccepted(accepted) => {
            if accepted.signer == channel.party() {
                return Err(ChannelError::InvalidSignature(channel.party().other()));
            }
            channel.record_counter_signature(&accepted.state, accepted.sig)?;
            Ok(None)
        }
        PeerMessage::UpdateRejected {
            seqno_a,
            seqno_b,
            reason,
            ..
        } => {
            warn!(channel_id = %channel.channel_id(), seqno_a, seqno_b, %reason, "proposal rejected by peer");
            Ok(None)
        }
        PeerMessage::CloseRequest(req) => Ok(Some(PeerMessage::CloseAccepted(channel.verify_close(req)?))),
        PeerMessage::CloseAccepted(close) => {
            if close.state != channel.last_accepted_state() {
                return Err(ChannelError::CloseStateMismatch);
            }
            if !close.verify(channel.config()) {
                return Err(ChannelError::InvalidSignature(channel.party().other()));
            }
            debug!(channel_id = %channel.channel_id(), "close accepted by peer");
            Ok(None)
        }
    }
}

fn party_to_wire(party: Party) -> u32 {
    party.index() as u32
}

fn party_from_wire(value: u32) -> Result<Party, ConversionError> {
    match value {
        0 => Ok(Party::A),
        1 => Ok(Party::B),
        other => Err(ConversionError::UnknownParty(other)),
    }
}

pub(crate) fn u256_to_wire(value: U256) -> Vec<u8> {
    u256_to_bytes(value).to_vec()
}

pub(crate) fn u256_from_wire(bytes: &[u8]) -> Result<U256, ConversionError> {
    u256_from_bytes(bytes).ok_or(ConversionError::ByteLengthMismatch)
}

fn sig_from_wire(bytes: Vec<u8>) -> Result<Signature, ConversionError> {
    Ok(Signature(
        bytes
            .try_into()
            .or(Err(ConversionError::ByteLengthMismatch))?,
    ))
}
