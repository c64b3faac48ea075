use super::{party_from_wire, party_to_wire, sig_from_wire, ConversionError};
use crate::{
    channel::{CloseRequest, CooperativeClose},
    wire::proto,
};

impl TryFrom<proto::SignedStateMsg> for CloseRequest {
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

impl From<CloseRequest> for proto::SignedStateMsg {
    fn from(value: CloseRequest) -> Self {
        Self {
            state: Some(value.state.into()),
            signer: party_to_wire(value.signer),
            sig: value.sig.0.to_vec(),
        }
    }
}

impl TryFrom<proto::CooperativeCloseMsg> for CooperativeClose {
    type Error = ConversionError;

    fn try_from(value: proto::CooperativeCloseMsg) -> Result<Self, Self::Error> {
        Ok(Self {
            state: value
                .state
                .ok_or(ConversionError::ExpectedSome)?
                .try_into()?,
            sig_a: sig_from_wire(value.sig_a)?,
            sig_b: sig_from_wire(value.sig_b)?,
        })
    }
}

impl From<CooperativeClose> for proto::CooperativeCloseMsg {
    fn from(value: CooperativeClose) -> Self {
        Self {
            state: Some(value.state.into()),
            sig_a: value.sig_a.0.to_vec(),
            sig_b: value.sig_b.0.to_vec(),
        }
    }
}
