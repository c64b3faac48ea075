//! On-chain side of a channel.
//!
//! [SettlementBackend] is the surface of the settlement contract (deploy,
//! fund, init, close and query). [SettlementAdapter] drives a local
//! [Channel] through it: every mutating call marks the channel as awaiting
//! confirmation, submits, and polls the backend until the expected phase is
//! reported or the configured maximum wait is over.

mod memory;
mod poll;

pub use memory::MemoryLedger;
pub use poll::{poll_until, PollConfig, PollError};

use crate::{
    channel::{
        Channel, ChannelConfig, ChannelError, ChannelState, ConfigMismatch, CooperativeClose,
        Operation, Party, PendingConfirmation, Phase, PhaseEvent,
    },
    dispute::{self, Claim, DisputeError},
    Address, U256,
};
use core::time::Duration;
use tracing::{info, warn};

/// Balances and seqnos as stored by the settlement contract.
///
/// Before the channel is open the balances are the deposits made so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainState {
    pub balance_a: U256,
    pub balance_b: U256,
    pub seqno_a: u64,
    pub seqno_b: u64,
}

impl OnChainState {
    pub fn balance(&self, party: Party) -> U256 {
        match party {
            Party::A => self.balance_a,
            Party::B => self.balance_b,
        }
    }

    pub fn seqno_pair(&self) -> (u64, u64) {
        (self.seqno_a, self.seqno_b)
    }
}

impl From<ChannelState> for OnChainState {
    fn from(state: ChannelState) -> Self {
        let (seqno_a, seqno_b) = state.seqno_pair();
        Self {
            balance_a: state.balance(Party::A),
            balance_b: state.balance(Party::B),
            seqno_a,
            seqno_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Worth retrying: node unreachable, transaction not yet visible, ...
    #[error("transient backend failure: {0}")]
    Transient(String),
    #[error("rejected by the settlement backend: {0}")]
    Rejected(String),
}

/// Operations of the settlement contract.
///
/// Calls return once the backend accepted the request, not once it took
/// effect; the effect shows up in [phase](SettlementBackend::phase) and
/// [balances](SettlementBackend::balances) later.
#[async_trait::async_trait]
pub trait SettlementBackend: Send + Sync {
    /// Deploy the contract for `config` and return its address.
    async fn deploy(&self, config: &ChannelConfig) -> Result<Address, BackendError>;

    /// Deposit `coins_a` for A and `coins_b` for B.
    async fn top_up(&self, channel: Address, coins_a: U256, coins_b: U256)
        -> Result<(), BackendError>;

    /// Open the funded channel with `state`.
    async fn init(&self, channel: Address, state: &ChannelState) -> Result<(), BackendError>;

    /// Settle with the close signatures of both parties.
    async fn close(&self, channel: Address, close: &CooperativeClose) -> Result<(), BackendError>;

    /// Register a unilateral claim, or challenge the registered one.
    async fn force_close(&self, channel: Address, claim: &Claim) -> Result<(), BackendError>;

    async fn phase(&self, channel: Address) -> Result<Phase, BackendError>;

    async fn balances(&self, channel: Address) -> Result<OnChainState, BackendError>;

    /// The claim registered by a forced close, with its signatures. `None`
    /// unless a dispute was opened.
    async fn registered_claim(&self, channel: Address) -> Result<Option<Claim>, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// The channel stays in "awaiting confirmation"; poll again with
    /// [SettlementAdapter::await_confirmation] or escalate.
    #[error("{operation:?} not confirmed after {waited:?}, still waiting for {target:?}")]
    Timeout {
        operation: Operation,
        target: Phase,
        waited: Duration,
    },
    #[error("channel configuration mismatch: {0}")]
    ConfigMismatch(ConfigMismatch),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Channel(ChannelError),
    #[error(transparent)]
    Dispute(#[from] DisputeError),
}

impl From<ChannelError> for SettlementError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::ConfigMismatch(e) => Self::ConfigMismatch(e),
            e => Self::Channel(e),
        }
    }
}

impl From<ConfigMismatch> for SettlementError {
    fn from(e: ConfigMismatch) -> Self {
        Self::ConfigMismatch(e)
    }
}

impl SettlementError {
    /// Errors after which the session has to be abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SettlementError::ConfigMismatch(_) | SettlementError::Backend(BackendError::Rejected(_))
        )
    }
}

fn contract_address(channel: &Channel) -> Result<Address, SettlementError> {
    channel
        .config()
        .channel_address()
        .map_err(|e| ChannelError::from(e).into())
}

/// Drives channels through a [SettlementBackend].
#[derive(Debug)]
pub struct SettlementAdapter<B> {
    backend: B,
    poll: PollConfig,
}

impl<B: SettlementBackend> SettlementAdapter<B> {
    pub fn new(backend: B, poll: PollConfig) -> Self {
        Self { backend, poll }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn query_phase(&self, channel: &Channel) -> Result<Phase, SettlementError> {
        Ok(self.backend.phase(contract_address(channel)?).await?)
    }

    pub async fn query_balances(&self, channel: &Channel) -> Result<OnChainState, SettlementError> {
        Ok(self.backend.balances(contract_address(channel)?).await?)
    }

    /// Bring the local phase up to what the backend reports.
    pub async fn refresh(&self, channel: &mut Channel) -> Result<Phase, SettlementError> {
        let observed = self.query_phase(channel).await?;
        Ok(channel.sync_phase(observed)?)
    }

    /// Poll until the backend reports at least `until`, then sync the
    /// channel.
    async fn confirm(
        &self,
        channel: &mut Channel,
        pending: PendingConfirmation,
        until: Phase,
    ) -> Result<Phase, SettlementError> {
        let address = contract_address(channel)?;
        let backend = &self.backend;
        let observed = poll_until(&self.poll, || async move {
            backend
                .phase(address)
                .await
                .map(|phase| (phase >= until).then_some(phase))
        })
        .await
        .map_err(|e| match e {
            PollError::TimedOut(waited) => {
                warn!(channel = ?address, operation = ?pending.operation, ?waited, "confirmation timed out");
                SettlementError::Timeout {
                    operation: pending.operation,
                    target: pending.target,
                    waited,
                }
            }
            PollError::Backend(e) => e.into(),
        })?;
        Ok(channel.sync_phase(observed)?)
    }

    /// Resume waiting for the operation the channel is awaiting.
    pub async fn await_confirmation(&self, channel: &mut Channel) -> Result<Phase, SettlementError> {
        match channel.awaiting() {
            Some(pending) => self.confirm(channel, pending, pending.target).await,
            None => self.refresh(channel).await,
        }
    }

    /// Deploy the contract and check that it lives where both parties expect
    /// it.
    pub async fn deploy(&self, channel: &mut Channel) -> Result<Address, SettlementError> {
        channel.begin_confirmation(Operation::Deploy)?;
        let address = self.backend.deploy(channel.config()).await?;
        channel.config().check_channel_address(address)?;
        info!(channel = ?address, party = %channel.party(), "deploy submitted");
        self.await_confirmation(channel).await?;
        Ok(address)
    }

    /// Deposit `amount` for the local party and wait until the deposit is
    /// visible. The channel keeps awaiting the top-up until both deposits
    /// are in.
    pub async fn top_up(&self, channel: &mut Channel, amount: U256) -> Result<(), SettlementError> {
        let address = contract_address(channel)?;
        let party = channel.party();
        let pending = channel.begin_confirmation(Operation::TopUp)?;

        let before = self.backend.balances(address).await?.balance(party);
        let expected = before
            .checked_add(amount)
            .ok_or(ChannelError::BalanceInvariantViolated)?;
        let (coins_a, coins_b) = match party {
            Party::A => (amount, U256::zero()),
            Party::B => (U256::zero(), amount),
        };
        self.backend.top_up(address, coins_a, coins_b).await?;
        info!(channel = ?address, party = %party, %amount, "top up submitted");

        let backend = &self.backend;
        poll_until(&self.poll, || async move {
            backend
                .balances(address)
                .await
                .map(|balances| (balances.balance(party) >= expected).then_some(()))
        })
        .await
        .map_err(|e| match e {
            PollError::TimedOut(waited) => SettlementError::Timeout {
                operation: pending.operation,
                target: pending.target,
                waited,
            },
            PollError::Backend(e) => e.into(),
        })?;

        self.refresh(channel).await?;
        Ok(())
    }

    /// Wait for both deposits, then open the channel with its initial state.
    pub async fn init(&self, channel: &mut Channel) -> Result<(), SettlementError> {
        if channel.phase() < Phase::Funded {
            let pending = channel.begin_confirmation(Operation::TopUp)?;
            self.confirm(channel, pending, Phase::Funded).await?;
        }
        let address = contract_address(channel)?;
        channel.begin_confirmation(Operation::Init)?;
        self.backend
            .init(address, &channel.config().initial_state())
            .await?;
        info!(channel = ?address, "init submitted");
        self.await_confirmation(channel).await?;
        Ok(())
    }

    /// Settle with both close signatures.
    pub async fn cooperative_close(
        &self,
        channel: &mut Channel,
        close: &CooperativeClose,
    ) -> Result<(), SettlementError> {
        if close.state != channel.last_accepted_state() {
            return Err(ChannelError::CloseStateMismatch.into());
        }
        if !close.verify(channel.config()) {
            return Err(ChannelError::InvalidSignature(channel.party().other()).into());
        }
        let address = contract_address(channel)?;
        channel.begin_confirmation(Operation::CooperativeClose)?;
        self.backend.close(address, close).await?;
        if channel.phase() == Phase::Open {
            channel.apply_event(PhaseEvent::CloseInitiated)?;
        }
        info!(channel = ?address, seqno = ?close.state.seqno_pair(), "cooperative close submitted");
        self.await_confirmation(channel).await?;
        Ok(())
    }

    /// Close unilaterally with the best claim we hold.
    ///
    /// `conflicting` is a claim we learned about outside the channel, for
    /// example a proposal of the peer we never countersigned; the better of
    /// it and our latest agreed state is submitted. Returns once the backend
    /// registered the dispute. The channel keeps awaiting the force close
    /// until the challenge period is over, see
    /// [await_confirmation](Self::await_confirmation).
    pub async fn force_close(
        &self,
        channel: &mut Channel,
        conflicting: Option<Claim>,
    ) -> Result<Claim, SettlementError> {
        let own = channel.claim();
        let claim = match conflicting {
            Some(other) => dispute::select(channel.config(), &own, &other)?,
            None => own,
        };
        let address = contract_address(channel)?;
        let pending = channel.begin_confirmation(Operation::ForceClose)?;
        self.backend.force_close(address, &claim).await?;
        if channel.phase() == Phase::Open {
            channel.apply_event(PhaseEvent::CloseInitiated)?;
        }
        warn!(channel = ?address, seqno = ?claim.state.seqno_pair(), "force close submitted");
        self.confirm(channel, pending, Phase::Closing).await?;
        Ok(claim)
    }

    /// React to a force close of the peer: if the registered claim loses
    /// against our latest agreed state, challenge it. That covers older
    /// states as well as newer ones the peer signed alone to take back what
    /// we agreed on. Returns whether a challenge was submitted.
    pub async fn contest(&self, channel: &mut Channel) -> Result<bool, SettlementError> {
        if self.refresh(channel).await? != Phase::Closing {
            return Ok(false);
        }
        let address = contract_address(channel)?;
        let Some(registered) = self.backend.registered_claim(address).await? else {
            return Ok(false);
        };
        let ours = channel.claim();
        if registered.state == ours.state
            || dispute::select(channel.config(), &registered, &ours)? != ours
        {
            return Ok(false);
        }

        channel.begin_confirmation(Operation::ForceClose)?;
        self.backend.force_close(address, &ours).await?;
        warn!(
            channel = ?address,
            ours = ?ours.state.seqno_pair(),
            theirs = ?registered.state.seqno_pair(),
            "challenged registered claim"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{test_support::Setup, Direction};

    fn poll() -> PollConfig {
        PollConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 4_000,
            backoff_factor: 2,
            max_wait_ms: 30_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_fund_and_open() {
        let setup = Setup::new(50);
        let adapter = SettlementAdapter::new(MemoryLedger::new(100), poll());
        let mut a = setup.channel(Party::A);
        let mut b = setup.channel(Party::B);

        let address = adapter.deploy(&mut a).await.unwrap();
        assert_eq!(address, setup.config.channel_address().unwrap());
        assert_eq!(a.phase(), Phase::Deployed);
        assert_eq!(adapter.refresh(&mut b).await, Ok(Phase::Deployed));

        adapter
            .top_up(&mut a, setup.config.init_balance_a)
            .await
            .unwrap();
        assert_eq!(a.phase(), Phase::Deployed);
        assert_eq!(a.awaiting(), Some(Operation::TopUp.into()));

        adapter
            .top_up(&mut b, setup.config.init_balance_b)
            .await
            .unwrap();
        assert_eq!(b.phase(), Phase::Funded);
        assert_eq!(b.awaiting(), None);

        adapter.init(&mut a).await.unwrap();
        assert_eq!(a.phase(), Phase::Open);
        assert_eq!(a.awaiting(), None);
        assert_eq!(adapter.refresh(&mut b).await, Ok(Phase::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_twice_is_fatal() {
        let setup = Setup::new(51);
        let adapter = SettlementAdapter::new(MemoryLedger::new(100), poll());
        let mut a = setup.channel(Party::A);
        let mut b = setup.channel(Party::B);

        adapter.deploy(&mut a).await.unwrap();
        let err = adapter.deploy(&mut b).await.unwrap_err();
        assert!(err.is_fatal(), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_awaiting() {
        let setup = Setup::new(52);
        let ledger = MemoryLedger::new(100);
        let adapter = SettlementAdapter::new(ledger.clone(), poll());
        let mut a = setup.channel(Party::A);
        let mut b = setup.channel(Party::B);

        adapter.deploy(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();
        adapter
            .top_up(&mut a, setup.config.init_balance_a)
            .await
            .unwrap();
        // B's deposit goes through, but no new block reports the phase.
        ledger.freeze(true);
        adapter
            .top_up(&mut b, setup.config.init_balance_b)
            .await
            .unwrap();
        assert_eq!(b.phase(), Phase::Deployed);

        let err = adapter.init(&mut a).await.unwrap_err();
        assert_eq!(
            err,
            SettlementError::Timeout {
                operation: Operation::TopUp,
                target: Phase::Funded,
                waited: Duration::from_secs(30),
            }
        );
        assert_eq!(a.phase(), Phase::Deployed);
        assert_eq!(a.awaiting(), Some(Operation::TopUp.into()));

        ledger.freeze(false);
        assert_eq!(adapter.await_confirmation(&mut a).await, Ok(Phase::Funded));
        assert_eq!(a.awaiting(), None);
        adapter.init(&mut a).await.unwrap();
        assert_eq!(a.phase(), Phase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_retries_transient_errors() {
        let setup = Setup::new(53);
        let ledger = MemoryLedger::new(100);
        let adapter = SettlementAdapter::new(ledger.clone(), poll());
        let mut a = setup.channel(Party::A);
        adapter.deploy(&mut a).await.unwrap();

        // A single query surfaces the failure...
        ledger.fail_next(1);
        assert!(matches!(
            adapter.refresh(&mut a).await,
            Err(SettlementError::Backend(BackendError::Transient(_)))
        ));

        // ...polling retries through it.
        ledger.fail_next(3);
        let pending = a.begin_confirmation(Operation::TopUp).unwrap();
        assert_eq!(
            adapter.confirm(&mut a, pending, Phase::Deployed).await,
            Ok(Phase::Deployed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn forced_close_and_contest() {
        let setup = Setup::new(54);
        let ledger = MemoryLedger::new(100);
        let adapter = SettlementAdapter::new(ledger.clone(), poll());
        let mut a = setup.channel(Party::A);
        let mut b = setup.channel(Party::B);

        adapter.deploy(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();
        adapter.top_up(&mut a, setup.config.init_balance_a).await.unwrap();
        adapter.top_up(&mut b, setup.config.init_balance_b).await.unwrap();
        adapter.init(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();

        let proposal = a.propose_transfer(500u64.into(), Direction::AToB).unwrap();
        let sig = b.verify_and_cosign(&proposal).unwrap();
        a.record_counter_signature(&proposal.state, sig).unwrap();
        let stale = a.claim();
        let proposal = a.propose_transfer(700u64.into(), Direction::AToB).unwrap();
        b.verify_and_cosign(&proposal).unwrap();

        // A never records the countersignature and force closes with its
        // stale agreed state.
        let submitted = adapter.force_close(&mut a, None).await.unwrap();
        assert_eq!(submitted, stale);
        assert_eq!(a.phase(), Phase::Closing);
        assert_eq!(a.awaiting(), Some(Operation::ForceClose.into()));

        assert_eq!(adapter.contest(&mut b).await, Ok(true));
        assert_eq!(adapter.contest(&mut b).await, Ok(false));

        ledger.advance(100);
        assert_eq!(adapter.await_confirmation(&mut a).await, Ok(Phase::Closed));
        assert_eq!(adapter.await_confirmation(&mut b).await, Ok(Phase::Closed));

        let final_state = b.last_accepted_state();
        assert_eq!(
            ledger.payout(setup.config.settlement_b),
            final_state.balance(Party::B)
        );
        assert_eq!(
            final_state.balance(Party::B),
            (16_000_000_000u64 + 1_200).into()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn contest_answers_a_forged_newer_claim() {
        let setup = Setup::new(57);
        let ledger = MemoryLedger::new(100);
        let adapter = SettlementAdapter::new(ledger.clone(), poll());
        let mut a = setup.channel(Party::A);
        let mut b = setup.channel(Party::B);

        adapter.deploy(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();
        adapter.top_up(&mut a, setup.config.init_balance_a).await.unwrap();
        adapter.top_up(&mut b, setup.config.init_balance_b).await.unwrap();
        adapter.init(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();

        let proposal = a.propose_transfer(1_000_000_000u64.into(), Direction::AToB).unwrap();
        let sig = b.verify_and_cosign(&proposal).unwrap();
        a.record_counter_signature(&proposal.state, sig).unwrap();

        // A registers a state with a higher seqno that only A signed and in
        // which the payment never happened.
        let reverted = setup.config.initial_state();
        let reverted = ChannelState::new(
            reverted.channel_id(),
            reverted.balance(Party::A),
            reverted.balance(Party::B),
            9,
            0,
        );
        let forged = Claim {
            state: reverted,
            sig_a: Some(reverted.sign(a.signer()).unwrap()),
            sig_b: None,
        };
        let address = setup.config.channel_address().unwrap();
        ledger.force_close(address, &forged).await.unwrap();

        assert_eq!(adapter.contest(&mut b).await, Ok(true));
        assert_eq!(adapter.contest(&mut b).await, Ok(false));

        ledger.advance(100);
        assert_eq!(adapter.await_confirmation(&mut b).await, Ok(Phase::Closed));
        assert_eq!(
            ledger.payout(setup.config.settlement_b),
            17_000_000_000u64.into()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn force_close_prefers_conflicting_newer_claim() {
        let setup = Setup::new(55);
        let ledger = MemoryLedger::new(100);
        let adapter = SettlementAdapter::new(ledger.clone(), poll());
        let mut a = setup.channel(Party::A);
        let mut b = setup.channel(Party::B);

        adapter.deploy(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();
        adapter.top_up(&mut a, setup.config.init_balance_a).await.unwrap();
        adapter.top_up(&mut b, setup.config.init_balance_b).await.unwrap();
        adapter.init(&mut a).await.unwrap();
        adapter.refresh(&mut b).await.unwrap();

        // A pays B, B never gets to countersign and closes with A's
        // signed proposal.
        let proposal = a.propose_transfer(900u64.into(), Direction::AToB).unwrap();
        let claim = adapter
            .force_close(&mut b, Some(proposal.into()))
            .await
            .unwrap();
        assert_eq!(claim.state, proposal.state);

        ledger.advance(100);
        adapter.await_confirmation(&mut b).await.unwrap();
        assert_eq!(
            ledger.payout(setup.config.settlement_b),
            (16_000_000_000u64 + 900).into()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_close_requires_matching_state() {
        let setup = Setup::new(56);
        let adapter = SettlementAdapter::new(MemoryLedger::new(100), poll());
        let (mut a, mut b) = setup.open_pair();
        let req = b.sign_close().unwrap();
        let close = a.verify_close(&req).unwrap();

        let mut other = close;
        other.state = other
            .state
            .transfer(Party::A, Direction::AToB, 1u64.into())
            .unwrap();
        assert_eq!(
            adapter.cooperative_close(&mut a, &other).await,
            Err(SettlementError::Channel(ChannelError::CloseStateMismatch))
        );
    }
}
