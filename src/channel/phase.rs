/// Lifecycle of a channel as seen by the settlement backend.
///
/// The order of the variants is the order of the lifecycle, so phases can be
/// compared to tell whether the backend is ahead of or behind the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Uninitialized,
    Deployed,
    Funded,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseEvent {
    DeployConfirmed,
    TopUpsConfirmed,
    InitConfirmed,
    CloseInitiated,
    SettlementConfirmed,
}

impl Phase {
    /// The phase reached by `event`, or `None` if `event` is not valid here.
    pub fn apply(self, event: PhaseEvent) -> Option<Phase> {
        use Phase::*;
        use PhaseEvent::*;

        match (self, event) {
            (Uninitialized, DeployConfirmed) => Some(Deployed),
            (Deployed, TopUpsConfirmed) => Some(Funded),
            (Funded, InitConfirmed) => Some(Open),
            (Open, CloseInitiated) => Some(Closing),
            (Closing, SettlementConfirmed) => Some(Closed),
            _ => None,
        }
    }

    /// The only event that moves this phase forward. `None` once closed.
    pub fn next_event(self) -> Option<PhaseEvent> {
        match self {
            Phase::Uninitialized => Some(PhaseEvent::DeployConfirmed),
            Phase::Deployed => Some(PhaseEvent::TopUpsConfirmed),
            Phase::Funded => Some(PhaseEvent::InitConfirmed),
            Phase::Open => Some(PhaseEvent::CloseInitiated),
            Phase::Closing => Some(PhaseEvent::SettlementConfirmed),
            Phase::Closed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Closed
    }
}

/// Backend operations whose effect has to be confirmed by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Deploy,
    TopUp,
    Init,
    CooperativeClose,
    ForceClose,
}

impl Operation {
    /// Phase the backend reports once the operation took effect.
    pub fn target(self) -> Phase {
        match self {
            Operation::Deploy => Phase::Deployed,
            Operation::TopUp => Phase::Funded,
            Operation::Init => Phase::Open,
            Operation::CooperativeClose | Operation::ForceClose => Phase::Closed,
        }
    }
}

/// "Awaiting confirmation of X": an operation was submitted, but the backend
/// did not report its target phase yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingConfirmation {
    pub operation: Operation,
    pub target: Phase,
}

impl From<Operation> for PendingConfirmation {
    fn from(operation: Operation) -> Self {
        Self {
            operation,
            target: operation.target(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 6] = [
        Phase::Uninitialized,
        Phase::Deployed,
        Phase::Funded,
        Phase::Open,
        Phase::Closing,
        Phase::Closed,
    ];

    #[test]
    fn next_event_walks_the_lifecycle() {
        let mut phase = Phase::Uninitialized;
        let mut visited = vec![phase];
        while let Some(event) = phase.next_event() {
            phase = phase.apply(event).unwrap();
            visited.push(phase);
        }
        assert_eq!(visited, ALL);
        assert!(phase.is_terminal());
    }

    #[test]
    fn only_one_event_is_valid_per_phase() {
        let events = [
            PhaseEvent::DeployConfirmed,
            PhaseEvent::TopUpsConfirmed,
            PhaseEvent::InitConfirmed,
            PhaseEvent::CloseInitiated,
            PhaseEvent::SettlementConfirmed,
        ];
        for phase in ALL {
            let valid: Vec<_> = events
                .iter()
                .filter(|e| phase.apply(**e).is_some())
                .collect();
            assert!(valid.len() <= 1, "{:?} accepts {:?}", phase, valid);
            assert_eq!(valid.first().copied().copied(), phase.next_event());
        }
    }

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::Funded < Phase::Open);
        assert!(Phase::Closing < Phase::Closed);
        assert_eq!(Operation::ForceClose.target(), Phase::Closed);
        assert_eq!(
            PendingConfirmation::from(Operation::TopUp).target,
            Phase::Funded
        );
    }
}
