use super::{Channel, ChannelConfig, ChannelError, ChannelState, Party, Phase, PhaseEvent};
use crate::Signature;
use tracing::{info, warn};

/// Request of one party to close the channel cooperatively on `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseRequest {
    pub state: ChannelState,
    pub signer: Party,
    pub sig: Signature,
}

/// A final state with the close signatures of both parties. This is what the
/// settlement backend needs to pay out without a challenge period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooperativeClose {
    pub state: ChannelState,
    pub sig_a: Signature,
    pub sig_b: Signature,
}

impl CooperativeClose {
    pub fn signature(&self, party: Party) -> Signature {
        match party {
            Party::A => self.sig_a,
            Party::B => self.sig_b,
        }
    }

    /// Both close signatures are valid and the state pays out exactly the
    /// deposits of `config`.
    pub fn verify(&self, config: &ChannelConfig) -> bool {
        self.state.channel_id() == config.channel_id
            && self.state.total() == config.total()
            && self.state.verify_close(self.sig_a, config.key_a)
            && self.state.verify_close(self.sig_b, config.key_b)
    }
}

impl Channel {
    /// Sign a close message over the last agreed state.
    ///
    /// The channel moves to [Phase::Closing]: from now on no transfer is
    /// proposed or countersigned, so the agreed state cannot move past the
    /// signed one.
    pub fn sign_close(&mut self) -> Result<CloseRequest, ChannelError> {
        self.ensure_closable()?;
        if self.pending_proposal().is_some() {
            return Err(ChannelError::ProposalPending);
        }
        let state = self.last_accepted_state();
        let sig = state.sign_close(self.signer())?;
        self.begin_close()?;
        info!(channel_id = %state.channel_id(), party = %self.party(), seqno = ?state.seqno_pair(), "requesting cooperative close");
        Ok(CloseRequest {
            state,
            signer: self.party(),
            sig,
        })
    }

    /// Check a close request of the peer and co-sign it.
    ///
    /// The request must be over exactly our last accepted state. Like
    /// [sign_close](Self::sign_close) this ends the transfer phase, and an own
    /// proposal still waiting for its countersignature is dropped.
    pub fn verify_close(&mut self, req: &CloseRequest) -> Result<CooperativeClose, ChannelError> {
        self.ensure_closable()?;
        let peer = self.party().other();
        if req.state.channel_id() != self.channel_id() {
            return Err(ChannelError::ChannelIdMismatch {
                expected: self.channel_id(),
                got: req.state.channel_id(),
            });
        }

        let latest = self.last_accepted_state();
        if req.state.encode()? != latest.encode()? {
            warn!(
                channel_id = %latest.channel_id(),
                ours = ?latest.seqno_pair(),
                theirs = ?req.state.seqno_pair(),
                "close request does not match our state"
            );
            return Err(ChannelError::CloseStateMismatch);
        }
        if req.signer != peer || !req.state.verify_close(req.sig, self.config().key(peer)) {
            return Err(ChannelError::InvalidSignature(peer));
        }

        let own = req.state.sign_close(self.signer())?;
        self.begin_close()?;
        Ok(self.assemble(req.state, own, req.sig))
    }

    /// Build the [CooperativeClose] from our own request and the peer's
    /// co-signature.
    pub fn complete_close(
        &self,
        req: &CloseRequest,
        peer_sig: Signature,
    ) -> Result<CooperativeClose, ChannelError> {
        let peer = self.party().other();
        if req.signer != self.party() || req.state != self.last_accepted_state() {
            return Err(ChannelError::CloseStateMismatch);
        }
        if !req.state.verify_close(peer_sig, self.config().key(peer)) {
            return Err(ChannelError::InvalidSignature(peer));
        }
        Ok(self.assemble(req.state, req.sig, peer_sig))
    }

    fn ensure_closable(&self) -> Result<(), ChannelError> {
        match self.phase() {
            Phase::Open | Phase::Closing => Ok(()),
            phase => Err(ChannelError::ChannelNotOpen(phase)),
        }
    }

    fn begin_close(&mut self) -> Result<(), ChannelError> {
        if self.phase() == Phase::Open {
            self.apply_event(PhaseEvent::CloseInitiated)?;
        }
        Ok(())
    }

    fn assemble(&self, state: ChannelState, own: Signature, peer: Signature) -> CooperativeClose {
        let (sig_a, sig_b) = match self.party() {
            Party::A => (own, peer),
            Party::B => (peer, own),
        };
        CooperativeClose {
            state,
            sig_a,
            sig_b,
        }
    }
}
