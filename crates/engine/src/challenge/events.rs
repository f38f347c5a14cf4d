use serde::Serialize;

use super::aggregator::SubsystemId;
use super::command::{CommandId, OptionSetSerial};
use super::controller::ChallengeState;
use super::integrity::IntegrityTier;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeEvent {
    OptionSetPresented {
        serial: OptionSetSerial,
        step_index: usize,
        option_ids: Vec<CommandId>,
        degraded: bool,
    },
    AnswerAccepted {
        step_index: usize,
        command_id: CommandId,
    },
    AnswerRejected {
        step_index: usize,
        command_id: CommandId,
    },
    CorruptionRaised {
        value: u32,
        percent: f32,
    },
    IntegrityTierChanged {
        from: IntegrityTier,
        to: IntegrityTier,
    },
    AttackLanded {
        damage: u32,
    },
    StateChanged {
        from: ChallengeState,
        to: ChallengeState,
    },
    ChallengeCompleted,
    ChallengeFailed,
    SessionRestarted {
        generation: u64,
    },
    SubsystemRepaired {
        subsystem_id: SubsystemId,
    },
    AllSubsystemsRepaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeEventKind {
    OptionSetPresented,
    AnswerAccepted,
    AnswerRejected,
    CorruptionRaised,
    IntegrityTierChanged,
    AttackLanded,
    StateChanged,
    ChallengeCompleted,
    ChallengeFailed,
    SessionRestarted,
    SubsystemRepaired,
    AllSubsystemsRepaired,
}

impl ChallengeEvent {
    pub fn kind(&self) -> ChallengeEventKind {
        match self {
            Self::OptionSetPresented { .. } => ChallengeEventKind::OptionSetPresented,
            Self::AnswerAccepted { .. } => ChallengeEventKind::AnswerAccepted,
            Self::AnswerRejected { .. } => ChallengeEventKind::AnswerRejected,
            Self::CorruptionRaised { .. } => ChallengeEventKind::CorruptionRaised,
            Self::IntegrityTierChanged { .. } => ChallengeEventKind::IntegrityTierChanged,
            Self::AttackLanded { .. } => ChallengeEventKind::AttackLanded,
            Self::StateChanged { .. } => ChallengeEventKind::StateChanged,
            Self::ChallengeCompleted => ChallengeEventKind::ChallengeCompleted,
            Self::ChallengeFailed => ChallengeEventKind::ChallengeFailed,
            Self::SessionRestarted { .. } => ChallengeEventKind::SessionRestarted,
            Self::SubsystemRepaired { .. } => ChallengeEventKind::SubsystemRepaired,
            Self::AllSubsystemsRepaired => ChallengeEventKind::AllSubsystemsRepaired,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChallengeEventCounts {
    pub total: u32,
    pub answers_accepted: u32,
    pub answers_rejected: u32,
    pub attacks_landed: u32,
    pub completed: u32,
    pub failed: u32,
    pub restarts: u32,
    pub all_repaired: u32,
}

impl ChallengeEventCounts {
    fn record(&mut self, kind: ChallengeEventKind) {
        self.total = self.total.saturating_add(1);
        match kind {
            ChallengeEventKind::AnswerAccepted => {
                self.answers_accepted = self.answers_accepted.saturating_add(1)
            }
            ChallengeEventKind::AnswerRejected => {
                self.answers_rejected = self.answers_rejected.saturating_add(1)
            }
            ChallengeEventKind::AttackLanded => {
                self.attacks_landed = self.attacks_landed.saturating_add(1)
            }
            ChallengeEventKind::ChallengeCompleted => {
                self.completed = self.completed.saturating_add(1)
            }
            ChallengeEventKind::ChallengeFailed => self.failed = self.failed.saturating_add(1),
            ChallengeEventKind::SessionRestarted => {
                self.restarts = self.restarts.saturating_add(1)
            }
            ChallengeEventKind::AllSubsystemsRepaired => {
                self.all_repaired = self.all_repaired.saturating_add(1)
            }
            ChallengeEventKind::OptionSetPresented
            | ChallengeEventKind::CorruptionRaised
            | ChallengeEventKind::IntegrityTierChanged
            | ChallengeEventKind::StateChanged
            | ChallengeEventKind::SubsystemRepaired => {}
        }
    }
}

/// Pending notifications for the presentation layer, plus running totals
/// that survive draining.
#[derive(Debug, Clone, Default)]
pub struct ChallengeEventBus {
    pending: Vec<ChallengeEvent>,
    lifetime_counts: ChallengeEventCounts,
}

impl ChallengeEventBus {
    pub fn emit(&mut self, event: ChallengeEvent) {
        self.lifetime_counts.record(event.kind());
        self.pending.push(event);
    }

    pub fn drain(&mut self) -> Vec<ChallengeEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[ChallengeEvent] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn lifetime_counts(&self) -> ChallengeEventCounts {
        self.lifetime_counts
    }
}
