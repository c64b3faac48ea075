use super::{ChannelState, Party};
use crate::{
    encoding::{self, types::Bytes4},
    Address, U256,
};
use serde::Serialize;

/// Domain tag for the channel address derivation.
const CONFIG_TAG: Bytes4 = Bytes4(*b"pcfg");

/// Channel configuration, agreed off-chain before anything is deployed.
///
/// Both parties must hold byte-identical copies. The settlement contract
/// address is derived from the canonical encoding of this struct, so any
/// difference between the two copies shows up as two different
/// [channel_address](ChannelConfig::channel_address)es.
///
/// The channel id must be fresh for every channel; settlement backends refuse
/// to deploy an id twice.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel_id: U256,
    /// Address derived from A's public key, used to verify A's signatures.
    pub key_a: Address,
    /// Address derived from B's public key, used to verify B's signatures.
    pub key_b: Address,
    /// Where A's balance is paid out when the channel is closed.
    pub settlement_a: Address,
    /// Where B's balance is paid out when the channel is closed.
    pub settlement_b: Address,
    pub init_balance_a: U256,
    pub init_balance_b: U256,
}

/// Setup errors. Any of these is fatal for the session: the channel must not
/// be deployed or used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigMismatch {
    #[error("local signer {actual:?} is not the configured key {expected:?}")]
    SignerMismatch { expected: Address, actual: Address },
    #[error("local channel address {local:?} differs from {remote:?}")]
    ChannelAddressMismatch { local: Address, remote: Address },
    #[error("both parties use the same key")]
    DuplicateParticipant,
    #[error("initial balances overflow")]
    BalanceOverflow,
}

#[derive(Serialize)]
struct TaggedConfig<'a> {
    tag: Bytes4,
    config: &'a ChannelConfig,
}

impl ChannelConfig {
    pub fn key(&self, party: Party) -> Address {
        match party {
            Party::A => self.key_a,
            Party::B => self.key_b,
        }
    }

    pub fn settlement_address(&self, party: Party) -> Address {
        match party {
            Party::A => self.settlement_a,
            Party::B => self.settlement_b,
        }
    }

    pub fn init_balance(&self, party: Party) -> U256 {
        match party {
            Party::A => self.init_balance_a,
            Party::B => self.init_balance_b,
        }
    }

    /// Which party signs with `key`, if any.
    pub fn party_of(&self, key: Address) -> Option<Party> {
        if key == self.key_a {
            Some(Party::A)
        } else if key == self.key_b {
            Some(Party::B)
        } else {
            None
        }
    }

    /// Sum of both deposits. Every state of the channel must add up to this.
    pub fn total(&self) -> Option<U256> {
        self.init_balance_a.checked_add(self.init_balance_b)
    }

    /// The state the channel is initialized with: initial balances, both
    /// seqnos zero.
    pub fn initial_state(&self) -> ChannelState {
        ChannelState::new(
            self.channel_id,
            self.init_balance_a,
            self.init_balance_b,
            0,
            0,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigMismatch> {
        if self.key_a == self.key_b {
            return Err(ConfigMismatch::DuplicateParticipant);
        }
        if self.total().is_none() {
            return Err(ConfigMismatch::BalanceOverflow);
        }
        Ok(())
    }

    /// Address of the settlement contract for this configuration.
    ///
    /// The last 20 bytes of keccak256 over the tagged canonical encoding.
    pub fn channel_address(&self) -> Result<Address, encoding::Error> {
        let hash = encoding::to_hash(&TaggedConfig {
            tag: CONFIG_TAG,
            config: self,
        })?;
        let mut addr = Address::default();
        addr.0.copy_from_slice(&hash.0[32 - 20..]);
        Ok(addr)
    }

    /// Compare our derived contract address with the one the counterparty
    /// (or the backend) reports.
    pub fn check_channel_address(&self, remote: Address) -> Result<(), ConfigMismatch> {
        let local = self
            .channel_address()
            .map_err(|_| ConfigMismatch::ChannelAddressMismatch { local: Address::default(), remote })?;
        if local == remote {
            Ok(())
        } else {
            Err(ConfigMismatch::ChannelAddressMismatch { local, remote })
        }
    }
}
