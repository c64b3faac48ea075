use super::{party_from_wire, party_to_wire, sig_from_wire, u256_from_wire, u256_to_wire, ConversionError};
use crate::{
    channel::{ChannelState, Party, SignedState},
    wire::proto,
};

impl TryFrom<proto::State> for ChannelState {
    type Error = ConversionError;

    fn try_from(value: proto::State) -> Result<Self, Self::Error> {
        Ok(ChannelState::new(
            u256_from_wire(&value.channel_id)?,
            u256_from_wire(&value.balance_a)?,
            u256_from_wire(&value.balance_b)?,
            value.seqno_a,
            value.seqno_b,
        ))
    }
}

impl From<ChannelState> for proto::State {
    fn from(value: ChannelState) -> Self {
        let (seqno_a, seqno_b) = value.seqno_pair();
        Self {
            channel_id: u256_to_wire(value.channel_id()),
            balance_a: u256_to_wire(value.balance(Party::A)),
            balance_b: u256_to_wire(value.balance(Party::B)),
            seqno_a,
            seqno_b,
        }
    }
}

impl TryFrom<proto::SignedStateMsg> for SignedState {
    type Error = ConversionError;

    fn try_from(value: proto::SignedStateMsg) -> Result<Self, Self::Error> {
        Ok(Self {
            state: value
                .state
                .ok_or(ConversionError::ExpectedSome)?
                .try_into()?,
            signer: party_from_wire(value.signer)?,
            sig: sig_from_wire(value.sig)?,
        })
    }
}

impl From<SignedState> for proto::SignedStateMsg {
    fn from(value: SignedState) -> Self {
        Self {
            state: Some(value.state.into()),
            signer: party_to_wire(value.signer),
            sig: value.sig.0.to_vec(),
        }
    }
}
