//! Protobuf messages exchanged between the two parties of a channel.
//!
//! Integers wider than 64 bits (channel ids, balances) are big-endian byte
//! strings of at most 32 bytes. Parties are `0` for A and `1` for B.

use prost::alloc::{string::String, vec::Vec};

#[derive(Clone, PartialEq, prost::Message)]
pub struct State {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub balance_a: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub balance_b: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub seqno_a: u64,
    #[prost(uint64, tag = "5")]
    pub seqno_b: u64,
}

/// A state with the signature of one party. Used for proposals, their
/// acceptance and close requests.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SignedStateMsg {
    #[prost(message, optional, tag = "1")]
    pub state: Option<State>,
    #[prost(uint32, tag = "2")]
    pub signer: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateRejectedMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub seqno_a: u64,
    #[prost(uint64, tag = "3")]
    pub seqno_b: u64,
    #[prost(string, tag = "4")]
    pub reason: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CooperativeCloseMsg {
    #[prost(message, optional, tag = "1")]
    pub state: Option<State>,
    #[prost(bytes = "vec", tag = "2")]
    pub sig_a: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub sig_b: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(oneof = "envelope::Msg", tags = "1, 2, 3, 4, 5")]
    pub msg: Option<envelope::Msg>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "1")]
        Update(super::SignedStateMsg),
        #[prost(message, tag = "2")]
        UpdateAccepted(super::SignedStateMsg),
        #[prost(message, tag = "3")]
        UpdateRejected(super::UpdateRejectedMsg),
        #[prost(message, tag = "4")]
        CloseRequest(super::SignedStateMsg),
        #[prost(message, tag = "5")]
        CloseAccepted(super::CooperativeCloseMsg),
    }
}
