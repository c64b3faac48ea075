//! Rules for unilateral settlement.
//!
//! A party that cannot close cooperatively submits a [Claim]: a state with the
//! signatures it holds. The settlement backend opens a [Dispute] on it, and
//! during the challenge period the other party may replace it with a newer
//! claim. Only claims signed by every party that loses money under them are
//! ever honoured, so nobody can pay themselves with a state the other party
//! never saw.

use crate::{
    channel::{AgreedState, ChannelConfig, ChannelState, Party, SignedState},
    Signature,
};
use core::time::Duration;
use serde::Deserialize;
use tracing::{debug, info};

/// A state plus whatever signatures the submitter has for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub state: ChannelState,
    pub sig_a: Option<Signature>,
    pub sig_b: Option<Signature>,
}

impl Claim {
    pub fn signature(&self, party: Party) -> Option<Signature> {
        match party {
            Party::A => self.sig_a,
            Party::B => self.sig_b,
        }
    }

    fn is_signed_by(&self, party: Party) -> bool {
        self.signature(party).is_some()
    }
}

impl From<AgreedState> for Claim {
    fn from(agreed: AgreedState) -> Self {
        Self {
            state: agreed.state(),
            sig_a: agreed.signature(Party::A),
            sig_b: agreed.signature(Party::B),
        }
    }
}

impl From<SignedState> for Claim {
    fn from(signed: SignedState) -> Self {
        let (sig_a, sig_b) = match signed.signer {
            Party::A => (Some(signed.sig), None),
            Party::B => (None, Some(signed.sig)),
        };
        Self {
            state: signed.state,
            sig_a,
            sig_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DisputeError {
    #[error("no admissible claim")]
    NoAdmissibleClaim,
    #[error("claim belongs to another channel")]
    ChannelIdMismatch,
    #[error("challenge period ended at {deadline}")]
    ChallengePeriodOver { deadline: u64 },
    #[error("challenge period runs until {deadline}")]
    ChallengePeriodRunning { deadline: u64 },
    #[error("claim does not supersede the registered one")]
    NotDominating,
}

/// Dispute parameters.
///
/// `challenge_period_secs` is how long a unilateral claim can be challenged.
/// `response_timeout_ms` is how long a party waits for a countersignature
/// before it considers the peer unresponsive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    pub challenge_period_secs: u64,
    pub response_timeout_ms: u64,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            challenge_period_secs: 24 * 60 * 60,
            response_timeout_ms: 30_000,
        }
    }
}

impl DisputeConfig {
    pub fn challenge_period(&self) -> Duration {
        Duration::from_secs(self.challenge_period_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Whether the backend may honour `claim`.
///
/// All present signatures must be valid, the balances must add up to the
/// deposits and every party whose balance is below its deposit must have
/// signed. Only the initial state may come without any signature.
pub fn admissible(config: &ChannelConfig, claim: &Claim) -> bool {
    let state = &claim.state;
    if state.channel_id() != config.channel_id || state.total() != config.total() {
        return false;
    }

    for party in [Party::A, Party::B] {
        if let Some(sig) = claim.signature(party) {
            if !state.verify(sig, config.key(party)) {
                return false;
            }
        }
        if state.balance(party) < config.init_balance(party) && !claim.is_signed_by(party) {
            return false;
        }
    }

    claim.sig_a.is_some() || claim.sig_b.is_some() || *state == config.initial_state()
}

/// Moving from `from` to `to` takes value from somebody, and every party
/// that loses by it signed `to`.
fn backed_by_losers(from: &Claim, to: &Claim) -> bool {
    let mut any = false;
    for party in [Party::A, Party::B] {
        if to.state.balance(party) < from.state.balance(party) {
            if !to.is_signed_by(party) {
                return false;
            }
            any = true;
        }
    }
    any
}

/// Every party that has less under `to` than under `from` signed `to`.
fn consented(from: &Claim, to: &Claim) -> bool {
    [Party::A, Party::B]
        .into_iter()
        .all(|party| to.state.balance(party) >= from.state.balance(party) || to.is_signed_by(party))
}

/// Pick the claim that is disbursed out of two conflicting ones.
///
/// Inadmissible claims are dropped. Otherwise the claim whose seqno pair
/// dominates the other wins, provided every party it takes value from
/// (compared with the other claim) signed it. A higher seqno signed by one
/// party alone never undoes what the other party agreed to. When neither
/// claim wins that way the `challenger` only wins if the parties that lose
/// by switching to it signed it; otherwise the `incumbent` stays.
pub fn select(
    config: &ChannelConfig,
    incumbent: &Claim,
    challenger: &Claim,
) -> Result<Claim, DisputeError> {
    match (admissible(config, incumbent), admissible(config, challenger)) {
        (false, false) => return Err(DisputeError::NoAdmissibleClaim),
        (true, false) => return Ok(*incumbent),
        (false, true) => return Ok(*challenger),
        (true, true) => {}
    }

    let (inc, ch) = (&incumbent.state, &challenger.state);
    let challenger_supersedes = ch.dominates(inc) && consented(incumbent, challenger);
    let incumbent_supersedes = inc.dominates(ch) && consented(challenger, incumbent);
    let winner = match (challenger_supersedes, incumbent_supersedes) {
        (true, false) => challenger,
        (false, true) => incumbent,
        _ => {
            if backed_by_losers(incumbent, challenger) && !backed_by_losers(challenger, incumbent) {
                challenger
            } else {
                incumbent
            }
        }
    };
    debug!(
        incumbent = ?inc.seqno_pair(),
        challenger = ?ch.seqno_pair(),
        winner = ?winner.state.seqno_pair(),
        "selected claim"
    );
    Ok(*winner)
}

/// A registered unilateral claim and its challenge window.
///
/// Times are seconds on the settlement backend's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispute {
    claim: Claim,
    deadline: u64,
    period: u64,
}

impl Dispute {
    pub fn open(
        config: &ChannelConfig,
        claim: Claim,
        now: u64,
        period: u64,
    ) -> Result<Self, DisputeError> {
        if claim.state.channel_id() != config.channel_id {
            return Err(DisputeError::ChannelIdMismatch);
        }
        if !admissible(config, &claim) {
            return Err(DisputeError::NoAdmissibleClaim);
        }
        let deadline = now.saturating_add(period);
        info!(channel_id = %config.channel_id, seqno = ?claim.state.seqno_pair(), deadline, "dispute opened");
        Ok(Self {
            claim,
            deadline,
            period,
        })
    }

    pub fn claim(&self) -> &Claim {
        &self.claim
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    pub fn is_over(&self, now: u64) -> bool {
        now >= self.deadline
    }

    /// Replace the registered claim by a superseding one. A successful
    /// challenge restarts the challenge period.
    pub fn challenge(
        &mut self,
        config: &ChannelConfig,
        claim: Claim,
        now: u64,
    ) -> Result<(), DisputeError> {
        if self.is_over(now) {
            return Err(DisputeError::ChallengePeriodOver {
                deadline: self.deadline,
            });
        }
        if claim.state.channel_id() != config.channel_id {
            return Err(DisputeError::ChannelIdMismatch);
        }
        if !admissible(config, &claim) {
            return Err(DisputeError::NoAdmissibleClaim);
        }
        if claim == self.claim || select(config, &self.claim, &claim)? != claim {
            return Err(DisputeError::NotDominating);
        }

        self.claim = claim;
        self.deadline = now.saturating_add(self.period);
        info!(channel_id = %config.channel_id, seqno = ?claim.state.seqno_pair(), deadline = self.deadline, "dispute challenged");
        Ok(())
    }

    /// The claim to disburse, once the challenge period is over.
    pub fn finalize(&self, now: u64) -> Result<Claim, DisputeError> {
        if self.is_over(now) {
            Ok(self.claim)
        } else {
            Err(DisputeError::ChallengePeriodRunning {
                deadline: self.deadline,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{test_support::Setup, Channel, Direction};

    fn pay(from: &mut Channel, to: &mut Channel, amount: u64) -> SignedState {
        let proposal = from
            .propose_transfer(amount.into(), Direction::paid_by(from.party()))
            .unwrap();
        let sig = to.verify_and_cosign(&proposal).unwrap();
        from.record_counter_signature(&proposal.state, sig).unwrap();
        proposal
    }

    #[test]
    fn initial_state_needs_no_signature() {
        let setup = Setup::new(30);
        let (a, _) = setup.open_pair();
        assert!(admissible(&setup.config, &a.claim()));

        // Any other unsigned state is never honoured.
        let mut claim = a.claim();
        claim.state = claim
            .state
            .transfer(Party::A, Direction::BToA, 1u64.into())
            .unwrap();
        assert!(!admissible(&setup.config, &claim));
    }

    #[test]
    fn loser_must_have_signed() {
        let setup = Setup::new(31);
        let (mut a, _) = setup.open_pair();

        // A pays B: A's signature alone is enough for B to claim it.
        let payment = a
            .propose_transfer(1_000u64.into(), Direction::AToB)
            .unwrap();
        assert!(admissible(&setup.config, &payment.into()));

        // A pulls from B without B's consent: never honoured.
        let mut a = setup.channel(Party::A);
        a.sync_phase(crate::channel::Phase::Open).unwrap();
        let pull = a
            .propose_transfer(1_000u64.into(), Direction::BToA)
            .unwrap();
        assert!(!admissible(&setup.config, &pull.into()));
    }

    #[test]
    fn forged_or_minting_claims_are_rejected() {
        let setup = Setup::new(32);
        let (mut a, mut b) = setup.open_pair();
        pay(&mut a, &mut b, 500);

        let mut forged = a.claim();
        forged.sig_b = forged.sig_a;
        assert!(!admissible(&setup.config, &forged));

        let mut other = setup.config;
        other.init_balance_b = other.init_balance_b + crate::encoding::types::U256::from(1u64);
        assert!(!admissible(&other, &a.claim()));
    }

    #[test]
    fn newer_state_wins() {
        let setup = Setup::new(33);
        let (mut a, mut b) = setup.open_pair();
        pay(&mut a, &mut b, 500);
        let old = b.claim();
        pay(&mut b, &mut a, 200);
        let new = a.claim();

        assert_eq!(select(&setup.config, &old, &new), Ok(new));
        assert_eq!(select(&setup.config, &new, &old), Ok(new));
    }

    #[test]
    fn higher_seqno_cannot_undo_agreed_payments() {
        let setup = Setup::new(40);
        let (mut a, mut b) = setup.open_pair();
        pay(&mut a, &mut b, 1_000_000_000);
        let agreed = b.claim();

        // A alone signs a later state that hands the payment back.
        let reverted = ChannelState::new(
            setup.config.channel_id,
            setup.config.init_balance_a,
            setup.config.init_balance_b,
            5,
            0,
        );
        let forged = Claim {
            state: reverted,
            sig_a: Some(reverted.sign(a.signer()).unwrap()),
            sig_b: None,
        };
        // A lost nothing against the deposits, so it may be registered.
        assert!(admissible(&setup.config, &forged));

        assert_eq!(select(&setup.config, &agreed, &forged), Ok(agreed));
        assert_eq!(select(&setup.config, &forged, &agreed), Ok(agreed));

        let mut dispute = Dispute::open(&setup.config, agreed, 0, 100).unwrap();
        assert_eq!(
            dispute.challenge(&setup.config, forged, 10),
            Err(DisputeError::NotDominating)
        );

        let mut dispute = Dispute::open(&setup.config, forged, 0, 100).unwrap();
        dispute.challenge(&setup.config, agreed, 10).unwrap();
        assert_eq!(
            dispute.finalize(110).unwrap().state.balance(Party::B),
            17_000_000_000u64.into()
        );
    }

    #[test]
    fn incomparable_states_need_the_losers_signature() {
        let setup = Setup::new(34);
        let (mut a, mut b) = setup.open_pair();
        // Both propose concurrently on the initial state; neither was
        // countersigned.
        let from_a: Claim = a
            .propose_transfer(100u64.into(), Direction::AToB)
            .unwrap()
            .into();
        let from_b: Claim = b
            .propose_transfer(40u64.into(), Direction::BToA)
            .unwrap()
            .into();

        // Moving from A's state (1,0) to B's state (0,1) hurts B, who signed.
        // Moving back hurts A, who signed its own proposal too. The incumbent
        // stays.
        assert_eq!(select(&setup.config, &from_a, &from_b), Ok(from_a));
        assert_eq!(select(&setup.config, &from_b, &from_a), Ok(from_b));
    }

    #[test]
    fn tie_break_favours_the_consented_state() {
        let setup = Setup::new(35);
        let (a, b) = setup.open_pair();
        let initial = setup.config.initial_state();

        let signed_by = |state: ChannelState, parties: &[Party]| Claim {
            state,
            sig_a: parties
                .contains(&Party::A)
                .then(|| state.sign(a.signer()).unwrap()),
            sig_b: parties
                .contains(&Party::B)
                .then(|| state.sign(b.signer()).unwrap()),
        };

        // Two versions of A's first proposal. Switching from `small` to `large`
        // only takes from A, who signed both.
        let small = initial.transfer(Party::A, Direction::AToB, 10u64.into()).unwrap();
        let large = initial.transfer(Party::A, Direction::AToB, 20u64.into()).unwrap();
        let small = signed_by(small, &[Party::A]);
        let large = signed_by(large, &[Party::A]);
        assert_eq!(select(&setup.config, &small, &large), Ok(large));
        assert_eq!(select(&setup.config, &large, &small), Ok(large));

        // Once B signed `small` as well, both moves are consented and the
        // incumbent stays.
        let small = signed_by(small.state, &[Party::A, Party::B]);
        assert_eq!(select(&setup.config, &small, &large), Ok(small));
        assert_eq!(select(&setup.config, &large, &small), Ok(large));
    }

    #[test]
    fn nothing_admissible() {
        let setup = Setup::new(36);
        let (mut a, _) = setup.open_pair();
        let pull: Claim = a
            .propose_transfer(1u64.into(), Direction::BToA)
            .unwrap()
            .into();
        assert_eq!(
            select(&setup.config, &pull, &pull),
            Err(DisputeError::NoAdmissibleClaim)
        );
    }

    #[test]
    fn challenge_window() {
        let setup = Setup::new(37);
        let (mut a, mut b) = setup.open_pair();
        pay(&mut a, &mut b, 500);
        let stale = b.claim();
        pay(&mut b, &mut a, 100);
        let latest = a.claim();

        let mut dispute = Dispute::open(&setup.config, stale, 1_000, 100).unwrap();
        assert_eq!(dispute.deadline(), 1_100);
        assert_eq!(
            dispute.finalize(1_099),
            Err(DisputeError::ChallengePeriodRunning { deadline: 1_100 })
        );

        assert_eq!(
            dispute.challenge(&setup.config, stale, 1_050),
            Err(DisputeError::NotDominating)
        );
        dispute.challenge(&setup.config, latest, 1_050).unwrap();
        assert_eq!(dispute.deadline(), 1_150);
        assert_eq!(
            dispute.challenge(&setup.config, stale, 1_060),
            Err(DisputeError::NotDominating)
        );

        assert_eq!(
            dispute.challenge(&setup.config, latest, 1_150),
            Err(DisputeError::ChallengePeriodOver { deadline: 1_150 })
        );
        assert_eq!(dispute.finalize(1_150), Ok(latest));
    }

    #[test]
    fn open_rejects_foreign_claims() {
        let setup = Setup::new(38);
        let other = Setup::new(39);
        let (a, _) = other.open_pair();
        assert_eq!(
            Dispute::open(&setup.config, a.claim(), 0, 10),
            Err(DisputeError::ChannelIdMismatch)
        );
    }

    #[test]
    fn config_defaults() {
        let config: DisputeConfig = serde_json::from_str(r#"{"response_timeout_ms": 5}"#).unwrap();
        assert_eq!(config.challenge_period(), Duration::from_secs(86_400));
        assert_eq!(config.response_timeout(), Duration::from_millis(5));
    }
}
