use super::{ChannelError, Direction, Party};
use crate::{
    encoding::{self, types::Bytes4},
    sig::{self, Signer},
    Address, Signature, U256,
};
use serde::Serialize;

/// Prefix of every signed channel state.
pub(crate) const STATE_TAG: Bytes4 = Bytes4(*b"pcst");
/// Prefix of every signed close message. Keeps state signatures and close
/// signatures apart even though both cover the same fields.
pub(crate) const CLOSE_TAG: Bytes4 = Bytes4(*b"pccl");

/// Snapshot of the balances and sequence numbers of a channel.
///
/// States are values: a transfer never mutates a state, it produces a new
/// one ([ChannelState::transfer]). The canonical encoding used for signing
/// covers all fields in declaration order.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelState {
    channel_id: U256,
    balance_a: U256,
    balance_b: U256,
    seqno_a: u64,
    seqno_b: u64,
}

#[derive(Serialize)]
struct Tagged<'a> {
    tag: Bytes4,
    state: &'a ChannelState,
}

impl ChannelState {
    pub fn new(channel_id: U256, balance_a: U256, balance_b: U256, seqno_a: u64, seqno_b: u64) -> Self {
        Self {
            channel_id,
            balance_a,
            balance_b,
            seqno_a,
            seqno_b,
        }
    }

    pub fn channel_id(&self) -> U256 {
        self.channel_id
    }

    pub fn balance(&self, party: Party) -> U256 {
        match party {
            Party::A => self.balance_a,
            Party::B => self.balance_b,
        }
    }

    pub fn seqno(&self, party: Party) -> u64 {
        match party {
            Party::A => self.seqno_a,
            Party::B => self.seqno_b,
        }
    }

    /// `(seqno_a, seqno_b)`
    pub fn seqno_pair(&self) -> (u64, u64) {
        (self.seqno_a, self.seqno_b)
    }

    pub fn total(&self) -> Option<U256> {
        self.balance_a.checked_add(self.balance_b)
    }

    /// Both seqnos are at least as high as the ones of `other`.
    pub fn dominates(&self, other: &ChannelState) -> bool {
        self.seqno_a >= other.seqno_a && self.seqno_b >= other.seqno_b
    }

    /// Build the successor state in which `proposer` moves `amount` in
    /// `direction`.
    ///
    /// Only the proposer's seqno is incremented. The proposer does not have
    /// to be the payer: a payee may propose a pull-payment, it only becomes
    /// effective once the payer countersigns.
    pub fn transfer(
        &self,
        proposer: Party,
        direction: Direction,
        amount: U256,
    ) -> Result<Self, ChannelError> {
        let payer = direction.payer();
        let available = self.balance(payer);
        let payer_balance =
            available
                .checked_sub(amount)
                .ok_or(ChannelError::InsufficientBalance {
                    available,
                    requested: amount,
                })?;
        let payee_balance = self
            .balance(direction.payee())
            .checked_add(amount)
            .ok_or(ChannelError::BalanceInvariantViolated)?;
        let seqno = self
            .seqno(proposer)
            .checked_add(1)
            .ok_or(ChannelError::SeqnoExhausted(proposer))?;

        let mut next = *self;
        match payer {
            Party::A => {
                next.balance_a = payer_balance;
                next.balance_b = payee_balance;
            }
            Party::B => {
                next.balance_b = payer_balance;
                next.balance_a = payee_balance;
            }
        }
        match proposer {
            Party::A => next.seqno_a = seqno,
            Party::B => next.seqno_b = seqno,
        }
        Ok(next)
    }

    fn tagged(&self, tag: Bytes4) -> Tagged<'_> {
        Tagged { tag, state: self }
    }

    /// Canonical bytes that are signed for this state.
    pub fn encode(&self) -> Result<Vec<u8>, encoding::Error> {
        encoding::to_bytes(&self.tagged(STATE_TAG))
    }

    pub fn sign(&self, signer: &Signer) -> Result<Signature, sig::Error> {
        signer.sign(&self.tagged(STATE_TAG))
    }

    pub fn verify(&self, sig: Signature, signer: Address) -> bool {
        sig::verify(&self.tagged(STATE_TAG), sig, signer)
    }

    pub fn sign_close(&self, signer: &Signer) -> Result<Signature, sig::Error> {
        signer.sign(&self.tagged(CLOSE_TAG))
    }

    pub fn verify_close(&self, sig: Signature, signer: Address) -> bool {
        sig::verify(&self.tagged(CLOSE_TAG), sig, signer)
    }
}

/// A state together with the signature of one party, as sent to the peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignedState {
    pub state: ChannelState,
    pub signer: Party,
    pub sig: Signature,
}

/// The latest state both parties agreed on.
///
/// Every agreed state carries both signatures, except the initial state of
/// the channel, which is fixed by the configuration and never signed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AgreedState {
    state: ChannelState,
    sig_a: Option<Signature>,
    sig_b: Option<Signature>,
}

impl AgreedState {
    pub(super) fn initial(state: ChannelState) -> Self {
        Self {
            state,
            sig_a: None,
            sig_b: None,
        }
    }

    pub(super) fn new(state: ChannelState, own: Party, own_sig: Signature, peer_sig: Signature) -> Self {
        let (sig_a, sig_b) = match own {
            Party::A => (own_sig, peer_sig),
            Party::B => (peer_sig, own_sig),
        };
        Self {
            state,
            sig_a: Some(sig_a),
            sig_b: Some(sig_b),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn signature(&self, party: Party) -> Option<Signature> {
        match party {
            Party::A => self.sig_a,
            Party::B => self.sig_b,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.sig_a.is_none() && self.sig_b.is_none()
    }
}
