//! Two-party off-chain payment channels.
//!
//! Both parties fund a settlement contract, then move value between each
//! other by exchanging signed [channel::ChannelState]s without touching the
//! ledger. A channel ends either cooperatively, with both parties signing
//! the final state, or unilaterally through a dispute in which the state with
//! the highest sequence numbers wins.
//!
//! - [channel]: the per-party state machine.
//! - [messages] and [wire]: what the parties send each other.
//! - [settlement]: talking to the ledger and waiting for confirmations.
//! - [dispute]: which claim wins a forced close.

mod encoding {
    mod error;
    mod hashing;
    mod ser;

    pub mod types;

    pub use error::Error;
    pub use hashing::to_hash;
    pub use ser::{to_bytes, to_writer, Writer};

    #[cfg(test)]
    mod tests;
}
pub mod sig;

pub mod channel;
pub mod dispute;
pub mod messages;
pub mod settlement;
pub mod wire;

pub use channel::{Channel, ChannelConfig, ChannelError, ChannelState, Direction, Party, Phase};
pub use encoding::types::{Address, Bytes4, Hash, Signature, U256};
pub use encoding::Error as EncodingError;
pub use messages::PeerMessage;
pub use settlement::{SettlementAdapter, SettlementBackend, SettlementError};
