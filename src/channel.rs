//! Two-party payment channel: configuration, states and the per-party state
//! machine.
//!
//! Each party runs its own [Channel]. Transfers are exchanged as
//! [SignedState]s: the proposer signs a new state, the counterparty checks it
//! against its last accepted state and countersigns. The pair of signatures
//! over the latest state is what either party can take on-chain.

mod close;
mod config;
mod machine;
mod phase;
mod state;

pub use close::{CloseRequest, CooperativeClose};
pub use config::{ChannelConfig, ConfigMismatch};
pub use machine::{Channel, PendingProposal};
pub use phase::{Operation, PendingConfirmation, Phase, PhaseEvent};
pub use state::{AgreedState, ChannelState, SignedState};

#[cfg(test)]
pub(crate) use machine::tests as test_support;

use crate::{encoding, sig, U256};
use core::fmt;

/// One of the two participants of a channel.
///
/// `A` is the party listed first in the [ChannelConfig]. The roles are
/// symmetric except for the tie-break of concurrent proposals, where `A`'s
/// proposal wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    A,
    B,
}

impl Party {
    pub fn other(self) -> Party {
        match self {
            Party::A => Party::B,
            Party::B => Party::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Party::A => 0,
            Party::B => 1,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::A => f.write_str("A"),
            Party::B => f.write_str("B"),
        }
    }
}

/// Which way value flows in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    /// The direction in which `payer` pays the other party.
    pub fn paid_by(payer: Party) -> Self {
        match payer {
            Party::A => Direction::AToB,
            Party::B => Direction::BToA,
        }
    }

    pub fn payer(self) -> Party {
        match self {
            Direction::AToB => Party::A,
            Direction::BToA => Party::B,
        }
    }

    pub fn payee(self) -> Party {
        self.payer().other()
    }
}

/// Everything the state machine can reject.
///
/// Apart from [ChannelError::ConfigMismatch] all of these are local: the
/// channel keeps its previous valid state and the caller decides whether to
/// resend, ignore the peer or escalate to a forced close.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel configuration mismatch: {0}")]
    ConfigMismatch(#[from] ConfigMismatch),
    #[error("invalid signature from party {0}")]
    InvalidSignature(Party),
    #[error("stale seqno for party {party}: last accepted {last}, got {got}")]
    StaleSeqno { party: Party, last: u64, got: u64 },
    #[error("seqno gap for party {party}: expected {expected}, got {got}")]
    SeqnoGap { party: Party, expected: u64, got: u64 },
    #[error("proposal claims our seqno is {got}, which we never signed")]
    UnknownCounterpartySeqno { got: u64 },
    #[error("balances do not add up to the channel total")]
    BalanceInvariantViolated,
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: U256, requested: U256 },
    #[error("channel is not open (phase {0:?})")]
    ChannelNotOpen(Phase),
    #[error("close request does not match the last accepted state")]
    CloseStateMismatch,
    #[error("message belongs to channel {got}, expected {expected}")]
    ChannelIdMismatch { expected: U256, got: U256 },
    #[error("an own proposal is still waiting for its countersignature")]
    ProposalPending,
    #[error("no matching pending proposal")]
    NoPendingProposal,
    #[error("concurrent proposal from the counterparty, ours takes precedence")]
    ConcurrentProposal,
    #[error("seqno of party {0} cannot be incremented any further")]
    SeqnoExhausted(Party),
    #[error("event {event:?} is not valid in phase {from:?}")]
    InvalidTransition { from: Phase, event: PhaseEvent },
    #[error("backend reports phase {observed:?}, but we are already in {local:?}")]
    PhaseRegression { local: Phase, observed: Phase },
    #[error("still awaiting confirmation of {0:?}")]
    AwaitingConfirmation(PendingConfirmation),
    #[error(transparent)]
    Encoding(#[from] encoding::Error),
    #[error("signing failed: {0}")]
    Signing(#[from] sig::Error),
}
