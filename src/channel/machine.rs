use super::{
    AgreedState, ChannelConfig, ChannelError, ChannelState, ConfigMismatch, Direction, Operation,
    Party, PendingConfirmation, Phase, PhaseEvent, SignedState,
};
use crate::{dispute::Claim, sig::Signer, Signature, U256};
use core::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// An own proposal that was sent but not countersigned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingProposal {
    pub proposal: SignedState,
    pub since: Instant,
}

/// The channel as seen by one of its two parties.
///
/// A `Channel` is owned by a single logical actor: every mutating method
/// takes `&mut self`. Wrap it in a lock if it has to be shared.
#[derive(Debug)]
pub struct Channel {
    party: Party,
    config: ChannelConfig,
    signer: Signer,
    phase: Phase,
    awaiting: Option<PendingConfirmation>,
    latest: AgreedState,
    pending: Option<PendingProposal>,
}

impl Channel {
    /// Set up the local side of a channel.
    ///
    /// Fails if the configuration is unusable or `signer` is not the key
    /// configured for `party`.
    pub fn new(party: Party, config: ChannelConfig, signer: Signer) -> Result<Self, ChannelError> {
        config.validate()?;
        let expected = config.key(party);
        if signer.address() != expected {
            return Err(ConfigMismatch::SignerMismatch {
                expected,
                actual: signer.address(),
            }
            .into());
        }

        Ok(Self {
            party,
            config,
            signer,
            phase: Phase::Uninitialized,
            awaiting: None,
            latest: AgreedState::initial(config.initial_state()),
            pending: None,
        })
    }

    pub fn party(&self) -> Party {
        self.party
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn channel_id(&self) -> U256 {
        self.config.channel_id
    }

    pub(crate) fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn awaiting(&self) -> Option<PendingConfirmation> {
        self.awaiting
    }

    pub fn last_accepted_state(&self) -> ChannelState {
        self.latest.state()
    }

    pub fn latest_agreed(&self) -> AgreedState {
        self.latest
    }

    pub fn pending_proposal(&self) -> Option<&PendingProposal> {
        self.pending.as_ref()
    }

    /// The outstanding own proposal, to be delivered again.
    pub fn resend_pending(&self) -> Option<SignedState> {
        self.pending.map(|p| p.proposal)
    }

    /// Whether the own proposal has waited for its countersignature for at
    /// least `timeout`. A stalled channel is a candidate for a forced close.
    pub fn is_stalled(&self, timeout: Duration) -> bool {
        self.pending
            .map(|p| p.since.elapsed() >= timeout)
            .unwrap_or(false)
    }

    /// What this party would submit for a unilateral close.
    pub fn claim(&self) -> Claim {
        self.latest.into()
    }

    pub(super) fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.phase == Phase::Open {
            Ok(())
        } else {
            Err(ChannelError::ChannelNotOpen(self.phase))
        }
    }

    pub fn propose_transfer(
        &mut self,
        amount: U256,
        direction: Direction,
    ) -> Result<SignedState, ChannelError> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Err(ChannelError::ProposalPending);
        }

        let state = self.latest.state().transfer(self.party, direction, amount)?;
        let sig = state.sign(&self.signer)?;
        let proposal = SignedState {
            state,
            signer: self.party,
            sig,
        };
        self.pending = Some(PendingProposal {
            proposal,
            since: Instant::now(),
        });

        info!(
            channel_id = %state.channel_id(),
            party = %self.party,
            %amount,
            ?direction,
            seqno = ?state.seqno_pair(),
            "proposed transfer"
        );
        Ok(proposal)
    }

    /// Check a proposal of the peer and countersign it.
    ///
    /// The proposal must build on our last accepted state, or on our own
    /// pending proposal if the peer already countersigned that one. On
    /// success the proposal becomes the last accepted state.
    ///
    /// The proposal may move value in either direction. A pull payment, in
    /// which the peer takes value from us, is consented to by calling this:
    /// check the amount and direction before if that needs a decision.
    pub fn verify_and_cosign(&mut self, msg: &SignedState) -> Result<Signature, ChannelError> {
        self.ensure_open()?;
        let peer = self.party.other();
        let state = msg.state;

        if state.channel_id() != self.config.channel_id {
            return Err(ChannelError::ChannelIdMismatch {
                expected: self.config.channel_id,
                got: state.channel_id(),
            });
        }
        if msg.signer != peer || !state.verify(msg.sig, self.config.key(peer)) {
            warn!(channel_id = %state.channel_id(), party = %self.party, "invalid signature on proposal");
            return Err(ChannelError::InvalidSignature(peer));
        }

        let latest = self.latest.state();
        if state == latest {
            if let Some(own_sig) = self.latest.signature(self.party) {
                debug!(channel_id = %state.channel_id(), seqno = ?state.seqno_pair(), "duplicate proposal");
                return Ok(own_sig);
            }
        }

        let last = latest.seqno(peer);
        let got = state.seqno(peer);
        if got <= last {
            return Err(ChannelError::StaleSeqno {
                party: peer,
                last,
                got,
            });
        }
        if got - last != 1 {
            return Err(ChannelError::SeqnoGap {
                party: peer,
                expected: last + 1,
                got,
            });
        }

        let own = state.seqno(self.party);
        let own_last = latest.seqno(self.party);
        let pending_seqno = self.pending.map(|p| p.proposal.state.seqno(self.party));
        if own == own_last {
            if self.pending.is_some() {
                if self.party == Party::A {
                    warn!(channel_id = %state.channel_id(), "rejecting concurrent proposal");
                    return Err(ChannelError::ConcurrentProposal);
                }
                debug!(channel_id = %state.channel_id(), "retiring own proposal for concurrent one");
            }
        } else if Some(own) != pending_seqno {
            return Err(if own < own_last {
                ChannelError::StaleSeqno {
                    party: self.party,
                    last: own_last,
                    got: own,
                }
            } else {
                ChannelError::UnknownCounterpartySeqno { got: own }
            });
        }

        if state.total() != self.config.total() {
            return Err(ChannelError::BalanceInvariantViolated);
        }

        let own_sig = state.sign(&self.signer)?;
        self.latest = AgreedState::new(state, self.party, own_sig, msg.sig);
        self.pending = None;

        info!(
            channel_id = %state.channel_id(),
            party = %self.party,
            seqno = ?state.seqno_pair(),
            balance_a = %state.balance(Party::A),
            balance_b = %state.balance(Party::B),
            "accepted proposal"
        );
        Ok(own_sig)
    }

    /// Complete an own proposal with the countersignature of the peer.
    ///
    /// A countersignature for a state that is already agreed (or superseded)
    /// is ignored once it verifies.
    pub fn record_counter_signature(
        &mut self,
        state: &ChannelState,
        peer_sig: Signature,
    ) -> Result<(), ChannelError> {
        let peer = self.party.other();
        let peer_key = self.config.key(peer);

        let pending = match self.pending {
            Some(p) if p.proposal.state == *state => p,
            _ => {
                let latest = self.latest.state();
                let superseded = *state == latest
                    || (state.channel_id() == latest.channel_id()
                        && state.seqno(self.party) <= latest.seqno(self.party));
                if !superseded {
                    return Err(ChannelError::NoPendingProposal);
                }
                if !state.verify(peer_sig, peer_key) {
                    return Err(ChannelError::InvalidSignature(peer));
                }
                debug!(channel_id = %state.channel_id(), seqno = ?state.seqno_pair(), "countersignature already recorded");
                return Ok(());
            }
        };

        if !state.verify(peer_sig, peer_key) {
            warn!(channel_id = %state.channel_id(), "invalid countersignature, proposal stays pending");
            return Err(ChannelError::InvalidSignature(peer));
        }

        self.latest = AgreedState::new(*state, self.party, pending.proposal.sig, peer_sig);
        self.pending = None;
        info!(
            channel_id = %state.channel_id(),
            party = %self.party,
            seqno = ?state.seqno_pair(),
            "proposal countersigned"
        );
        Ok(())
    }

    pub fn apply_event(&mut self, event: PhaseEvent) -> Result<Phase, ChannelError> {
        let next = self
            .phase
            .apply(event)
            .ok_or(ChannelError::InvalidTransition {
                from: self.phase,
                event,
            })?;
        debug!(channel_id = %self.config.channel_id, from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;

        if let Some(awaiting) = self.awaiting {
            if next >= awaiting.target {
                self.awaiting = None;
            }
        }
        if next == Phase::Closing || next == Phase::Closed {
            self.pending = None;
        }
        Ok(next)
    }

    /// Catch up with the phase reported by the settlement backend.
    pub fn sync_phase(&mut self, observed: Phase) -> Result<Phase, ChannelError> {
        // A close starts locally before the backend sees it.
        if self.phase == Phase::Closing && observed == Phase::Open {
            return Ok(self.phase);
        }
        if observed < self.phase {
            return Err(ChannelError::PhaseRegression {
                local: self.phase,
                observed,
            });
        }
        while self.phase < observed {
            match self.phase.next_event() {
                Some(event) => self.apply_event(event)?,
                None => break,
            };
        }
        Ok(self.phase)
    }

    /// Enter "awaiting confirmation of `operation`".
    ///
    /// Re-entering the same operation is allowed, so an interrupted operation
    /// can be resumed.
    pub(crate) fn begin_confirmation(
        &mut self,
        operation: Operation,
    ) -> Result<PendingConfirmation, ChannelError> {
        match self.awaiting {
            Some(awaiting) if awaiting.operation != operation => {
                Err(ChannelError::AwaitingConfirmation(awaiting))
            }
            _ => {
                let awaiting = PendingConfirmation::from(operation);
                self.awaiting = Some(awaiting);
                Ok(awaiting)
            }
        }
    }
}
