use super::{BackendError, OnChainState, SettlementBackend};
use crate::{
    channel::{ChannelConfig, ChannelState, CooperativeClose, Party, Phase},
    dispute::{Claim, Dispute},
    Address, U256,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info};

/// In-process settlement backend.
///
/// Enforces the same rules as the settlement contract: one deployment per
/// channel id, deposits up to the configured initial balances, init only
/// once funded, payouts only for cooperatively signed or undisputed states.
/// Time is a manual clock in seconds, see [MemoryLedger::advance].
///
/// Clones share the same ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Ledger>>,
}

#[derive(Debug, Default)]
struct Ledger {
    now: u64,
    challenge_period: u64,
    contracts: HashMap<Address, Contract>,
    used_ids: HashSet<U256>,
    payouts: HashMap<Address, U256>,
    transient_failures: u32,
    frozen: Option<HashMap<Address, Phase>>,
}

#[derive(Debug)]
struct Contract {
    config: ChannelConfig,
    phase: Phase,
    deposit_a: U256,
    deposit_b: U256,
    state: ChannelState,
    dispute: Option<Dispute>,
}

fn rejected(reason: &str) -> BackendError {
    BackendError::Rejected(reason.to_string())
}

impl Contract {
    fn deposit(&self, party: Party) -> U256 {
        match party {
            Party::A => self.deposit_a,
            Party::B => self.deposit_b,
        }
    }

    fn expect_phase(&self, allowed: &[Phase]) -> Result<(), BackendError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(BackendError::Rejected(format!(
                "operation not allowed in phase {:?}",
                self.phase
            )))
        }
    }
}

impl Ledger {
    fn contract(&mut self, address: Address) -> Result<&mut Contract, BackendError> {
        self.contracts
            .get_mut(&address)
            .ok_or_else(|| rejected("unknown contract"))
    }

    fn take_failure(&mut self) -> Result<(), BackendError> {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(BackendError::Transient("injected failure".into()));
        }
        Ok(())
    }

    /// Pay out a dispute whose challenge period is over.
    fn settle_expired(&mut self, address: Address) {
        let now = self.now;
        let Some(contract) = self.contracts.get_mut(&address) else {
            return;
        };
        if contract.phase != Phase::Closing {
            return;
        }
        let Some(claim) = contract.dispute.and_then(|d| d.finalize(now).ok()) else {
            return;
        };
        contract.state = claim.state;
        contract.phase = Phase::Closed;
        let config = contract.config;
        info!(channel = ?address, seqno = ?claim.state.seqno_pair(), "dispute settled");
        self.disburse(&config, &claim.state);
    }

    fn disburse(&mut self, config: &ChannelConfig, state: &ChannelState) {
        for party in [Party::A, Party::B] {
            let payout = self
                .payouts
                .entry(config.settlement_address(party))
                .or_insert_with(U256::zero);
            *payout = payout.saturating_add(state.balance(party));
        }
    }
}

impl MemoryLedger {
    pub fn new(challenge_period: u64) -> Self {
        let ledger = Self::default();
        ledger.lock().challenge_period = challenge_period;
        ledger
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> u64 {
        self.lock().now
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        let mut ledger = self.lock();
        ledger.now = ledger.now.saturating_add(secs);
    }

    /// Total amount paid out to `address` so far.
    pub fn payout(&self, address: Address) -> U256 {
        self.lock()
            .payouts
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// Let the next `count` queries fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.lock().transient_failures = count;
    }

    /// While frozen, queries keep reporting the phases of the moment the
    /// ledger was frozen, as if no new block arrived.
    pub fn freeze(&self, frozen: bool) {
        let mut ledger = self.lock();
        ledger.frozen = if frozen {
            Some(
                ledger
                    .contracts
                    .iter()
                    .map(|(address, c)| (*address, c.phase))
                    .collect(),
            )
        } else {
            None
        };
    }
}

#[async_trait::async_trait]
impl SettlementBackend for MemoryLedger {
    async fn deploy(&self, config: &ChannelConfig) -> Result<Address, BackendError> {
        config
            .validate()
            .map_err(|e| BackendError::Rejected(e.to_string()))?;
        let address = config
            .channel_address()
            .map_err(|e| BackendError::Rejected(e.to_string()))?;

        let mut ledger = self.lock();
        if !ledger.used_ids.insert(config.channel_id) {
            return Err(rejected("channel id already used"));
        }
        ledger.contracts.insert(
            address,
            Contract {
                config: *config,
                phase: Phase::Deployed,
                deposit_a: U256::zero(),
                deposit_b: U256::zero(),
                state: config.initial_state(),
                dispute: None,
            },
        );
        info!(channel = ?address, channel_id = %config.channel_id, "contract deployed");
        Ok(address)
    }

    async fn top_up(
        &self,
        channel: Address,
        coins_a: U256,
        coins_b: U256,
    ) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        let contract = ledger.contract(channel)?;
        contract.expect_phase(&[Phase::Deployed])?;

        let deposit_a = contract
            .deposit_a
            .checked_add(coins_a)
            .filter(|d| *d <= contract.config.init_balance_a)
            .ok_or_else(|| rejected("deposit of A exceeds its initial balance"))?;
        let deposit_b = contract
            .deposit_b
            .checked_add(coins_b)
            .filter(|d| *d <= contract.config.init_balance_b)
            .ok_or_else(|| rejected("deposit of B exceeds its initial balance"))?;
        contract.deposit_a = deposit_a;
        contract.deposit_b = deposit_b;

        if [Party::A, Party::B]
            .iter()
            .all(|p| contract.deposit(*p) == contract.config.init_balance(*p))
        {
            contract.phase = Phase::Funded;
        }
        debug!(channel = ?channel, %deposit_a, %deposit_b, phase = ?contract.phase, "top up");
        Ok(())
    }

    async fn init(&self, channel: Address, state: &ChannelState) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        let contract = ledger.contract(channel)?;
        contract.expect_phase(&[Phase::Funded])?;
        if *state != contract.config.initial_state() {
            return Err(rejected("initial state does not match the deposits"));
        }
        contract.state = *state;
        contract.phase = Phase::Open;
        info!(channel = ?channel, "channel open");
        Ok(())
    }

    async fn close(&self, channel: Address, close: &CooperativeClose) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        let contract = ledger.contract(channel)?;
        contract.expect_phase(&[Phase::Open, Phase::Closing])?;
        if !close.verify(&contract.config) {
            return Err(rejected("invalid cooperative close"));
        }
        contract.state = close.state;
        contract.phase = Phase::Closed;
        contract.dispute = None;
        let config = contract.config;
        ledger.disburse(&config, &close.state);
        info!(channel = ?channel, seqno = ?close.state.seqno_pair(), "closed cooperatively");
        Ok(())
    }

    async fn force_close(&self, channel: Address, claim: &Claim) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        ledger.settle_expired(channel);
        let (now, period) = (ledger.now, ledger.challenge_period);
        let contract = ledger.contract(channel)?;
        contract.expect_phase(&[Phase::Open, Phase::Closing])?;

        let config = contract.config;
        match contract.dispute.as_mut() {
            None => {
                let dispute = Dispute::open(&config, *claim, now, period)
                    .map_err(|e| BackendError::Rejected(e.to_string()))?;
                contract.dispute = Some(dispute);
                contract.phase = Phase::Closing;
            }
            Some(dispute) => dispute
                .challenge(&config, *claim, now)
                .map_err(|e| BackendError::Rejected(e.to_string()))?,
        }
        contract.state = claim.state;
        Ok(())
    }

    async fn phase(&self, channel: Address) -> Result<Phase, BackendError> {
        let mut ledger = self.lock();
        ledger.take_failure()?;
        ledger.settle_expired(channel);
        if let Some(phase) = ledger.frozen.as_ref().and_then(|f| f.get(&channel)) {
            return Ok(*phase);
        }
        if ledger.frozen.is_some() {
            return Ok(Phase::Uninitialized);
        }
        Ok(ledger.contract(channel)?.phase)
    }

    async fn balances(&self, channel: Address) -> Result<OnChainState, BackendError> {
        let mut ledger = self.lock();
        ledger.take_failure()?;
        ledger.settle_expired(channel);
        let contract = ledger.contract(channel)?;
        Ok(match contract.phase {
            Phase::Uninitialized | Phase::Deployed | Phase::Funded => OnChainState {
                balance_a: contract.deposit_a,
                balance_b: contract.deposit_b,
                seqno_a: 0,
                seqno_b: 0,
            },
            Phase::Open | Phase::Closing | Phase::Closed => contract.state.into(),
        })
    }

    async fn registered_claim(&self, channel: Address) -> Result<Option<Claim>, BackendError> {
        let mut ledger = self.lock();
        ledger.take_failure()?;
        ledger.settle_expired(channel);
        Ok(ledger.contract(channel)?.dispute.map(|d| *d.claim()))
    }
}
