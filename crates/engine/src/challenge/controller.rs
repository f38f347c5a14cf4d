use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::command::{CommandId, OptionSet, OptionSetSerial, Step};
use super::config::{ChallengeConfig, ConfigError};
use super::events::{ChallengeEvent, ChallengeEventBus};
use super::integrity::{IntegrityMeter, IntegrityStatus, IntegrityTier};
use super::option_pool::{OptionPool, OptionPoolError};
use super::rng::ChallengeRng;
use super::sequencer::{Cursor, StepSequencer, Submission};
use super::threat_clock::ThreatClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Idle,
    Presenting,
    AllStepsComplete,
    Infected,
}

impl ChallengeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AllStepsComplete | Self::Infected)
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Presenting => "presenting",
            Self::AllStepsComplete => "all_steps_complete",
            Self::Infected => "infected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredSubmit {
    NotPresenting,
    AlreadyRejected,
    StaleOptionSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitResult {
    Correct,
    Incorrect,
    Ignored(IgnoredSubmit),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub result: SubmitResult,
    pub next_option_set: Option<OptionSet>,
    pub state_now: ChallengeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickOutcome {
    pub state_now: ChallengeState,
    pub corruption_percent: f32,
    pub threat_ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub challenge: String,
    pub state: ChallengeState,
    pub current_index: usize,
    pub step_count: usize,
    pub elapsed_ms: u64,
    pub threshold_ms: u64,
    pub threat_ratio: f32,
    pub corruption_value: u32,
    pub corruption_percent: f32,
    pub integrity_tier: IntegrityTier,
    pub generation: u64,
}

/// Mutable state of one scene instance. Replaced wholesale on restart.
#[derive(Debug, Clone)]
pub struct ChallengeSession {
    sequencer: StepSequencer,
    pool: OptionPool,
    clock: ThreatClock,
    meter: IntegrityMeter,
    used_command_ids: HashSet<CommandId>,
    attack_carry_ms: u64,
    generation: u64,
}

impl ChallengeSession {
    fn new(config: &ChallengeConfig, generation: u64) -> Self {
        Self {
            sequencer: StepSequencer::new(config.steps.clone()),
            pool: OptionPool::new(
                config.command_pool.clone(),
                ChallengeRng::for_session(config.seed, generation),
            ),
            clock: ThreatClock::new(config.threshold_ms),
            meter: IntegrityMeter::new(config.max_corruption),
            used_command_ids: HashSet::new(),
            attack_carry_ms: 0,
            generation,
        }
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn pool(&self) -> &OptionPool {
        &self.pool
    }

    pub fn clock(&self) -> &ThreatClock {
        &self.clock
    }

    pub fn meter(&self) -> &IntegrityMeter {
        &self.meter
    }

    pub fn used_command_ids(&self) -> &HashSet<CommandId> {
        &self.used_command_ids
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone)]
struct PresentedSet {
    set: OptionSet,
    rejected: HashSet<CommandId>,
}

/// Per-scene state machine binding one session to the presentation layer.
///
/// All entry points are safe to call in any state. `AllStepsComplete` and
/// `Infected` turn `submit`, `on_tick` and `on_attack` into no-ops; only
/// `restart` leaves them.
#[derive(Debug, Clone)]
pub struct ChallengeController {
    config: ChallengeConfig,
    session: ChallengeSession,
    state: ChallengeState,
    presented: Option<PresentedSet>,
    next_serial: u64,
    has_breached_once: bool,
    events: ChallengeEventBus,
}

impl ChallengeController {
    pub fn new(config: ChallengeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = ChallengeSession::new(&config, 0);
        info!(
            challenge = %config.name,
            steps = config.steps.len(),
            pool = session.pool.len(),
            threshold_ms = config.threshold_ms,
            reward_ms = config.reward_ms,
            max_corruption = config.max_corruption,
            "challenge_session_started"
        );
        Ok(Self {
            config,
            session,
            state: ChallengeState::Idle,
            presented: None,
            next_serial: 0,
            has_breached_once: false,
            events: ChallengeEventBus::default(),
        })
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn session(&self) -> &ChallengeSession {
        &self.session
    }

    pub fn current_option_set(&self) -> Option<&OptionSet> {
        self.presented.as_ref().map(|presented| &presented.set)
    }

    pub fn rejected_in_current_set(&self) -> Option<&HashSet<CommandId>> {
        self.presented.as_ref().map(|presented| &presented.rejected)
    }

    pub fn events(&self) -> &ChallengeEventBus {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ChallengeEvent> {
        self.events.drain()
    }

    pub fn tick_outcome(&self) -> TickOutcome {
        TickOutcome {
            state_now: self.state,
            corruption_percent: self.session.meter.percent(),
            threat_ratio: self.session.clock.ratio(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            challenge: self.config.name.clone(),
            state: self.state,
            current_index: self.session.sequencer.current_index(),
            step_count: self.session.sequencer.len(),
            elapsed_ms: self.session.clock.elapsed_ms(),
            threshold_ms: self.session.clock.threshold_ms(),
            threat_ratio: self.session.clock.ratio(),
            corruption_value: self.session.meter.value(),
            corruption_percent: self.session.meter.percent(),
            integrity_tier: self.session.meter.tier(),
            generation: self.session.generation,
        }
    }

    /// Shows the first option set. Repeated calls while presenting return the
    /// visible set unchanged; terminal states return `None`.
    pub fn present(&mut self) -> Result<Option<OptionSet>, OptionPoolError> {
        match self.state {
            ChallengeState::Idle => {
                let set = self.present_current_step()?;
                self.transition(ChallengeState::Presenting);
                Ok(set)
            }
            ChallengeState::Presenting => Ok(self.current_option_set().cloned()),
            ChallengeState::AllStepsComplete | ChallengeState::Infected => Ok(None),
        }
    }

    pub fn submit(&mut self, command_id: &CommandId) -> Result<SubmitOutcome, OptionPoolError> {
        self.submit_inner(None, command_id)
    }

    /// Like `submit`, but ignored unless `serial` names the visible set.
    /// Lets late duplicate clicks from an earlier set fall through harmlessly.
    pub fn submit_to(
        &mut self,
        serial: OptionSetSerial,
        command_id: &CommandId,
    ) -> Result<SubmitOutcome, OptionPoolError> {
        self.submit_inner(Some(serial), command_id)
    }

    fn submit_inner(
        &mut self,
        serial: Option<OptionSetSerial>,
        command_id: &CommandId,
    ) -> Result<SubmitOutcome, OptionPoolError> {
        if let Some(reason) = self.submit_guard(serial, command_id) {
            warn!(
                challenge = %self.config.name,
                state = self.state.as_token(),
                command = %command_id,
                reason = ?reason,
                "submit_ignored"
            );
            return Ok(self.ignored(reason));
        }

        let step_index = self.session.sequencer.current_index();
        match self.session.sequencer.submit(command_id) {
            Submission::Incorrect => {
                if let Some(presented) = self.presented.as_mut() {
                    presented.rejected.insert(command_id.clone());
                }
                debug!(
                    challenge = %self.config.name,
                    step = step_index,
                    command = %command_id,
                    "answer_rejected"
                );
                self.events.emit(ChallengeEvent::AnswerRejected {
                    step_index,
                    command_id: command_id.clone(),
                });
                Ok(SubmitOutcome {
                    result: SubmitResult::Incorrect,
                    next_option_set: None,
                    state_now: self.state,
                })
            }
            Submission::Correct => {
                self.session.clock.reward(self.config.reward_ms);
                // A resolved set's decoys count as used along with its answer.
                if let Some(resolved) = self.presented.take() {
                    self.session
                        .used_command_ids
                        .extend(resolved.set.option_ids());
                }
                self.session.used_command_ids.insert(command_id.clone());
                info!(
                    challenge = %self.config.name,
                    step = step_index,
                    command = %command_id,
                    threat_ratio = self.session.clock.ratio(),
                    "answer_accepted"
                );
                self.events.emit(ChallengeEvent::AnswerAccepted {
                    step_index,
                    command_id: command_id.clone(),
                });

                if self.session.sequencer.is_done() {
                    self.transition(ChallengeState::AllStepsComplete);
                    self.events.emit(ChallengeEvent::ChallengeCompleted);
                    return Ok(SubmitOutcome {
                        result: SubmitResult::Correct,
                        next_option_set: None,
                        state_now: self.state,
                    });
                }

                let next_option_set = self.present_current_step()?;
                Ok(SubmitOutcome {
                    result: SubmitResult::Correct,
                    next_option_set,
                    state_now: self.state,
                })
            }
        }
    }

    fn submit_guard(
        &self,
        serial: Option<OptionSetSerial>,
        command_id: &CommandId,
    ) -> Option<IgnoredSubmit> {
        if self.state != ChallengeState::Presenting {
            return Some(IgnoredSubmit::NotPresenting);
        }
        let Some(presented) = self.presented.as_ref() else {
            return Some(IgnoredSubmit::NotPresenting);
        };
        if serial.is_some_and(|serial| serial != presented.set.serial) {
            return Some(IgnoredSubmit::StaleOptionSet);
        }
        if presented.rejected.contains(command_id) {
            return Some(IgnoredSubmit::AlreadyRejected);
        }
        None
    }

    fn ignored(&self, reason: IgnoredSubmit) -> SubmitOutcome {
        SubmitOutcome {
            result: SubmitResult::Ignored(reason),
            next_option_set: None,
            state_now: self.state,
        }
    }

    pub fn on_tick(&mut self, delta_ms: u64) -> TickOutcome {
        if self.state.is_terminal() {
            return self.tick_outcome();
        }

        self.session.clock.tick(delta_ms);
        debug!(
            challenge = %self.config.name,
            elapsed_ms = self.session.clock.elapsed_ms(),
            threat_ratio = self.session.clock.ratio(),
            corruption = self.session.meter.value(),
            "challenge_tick"
        );

        if self.session.clock.is_expired() && !self.has_breached_once {
            let to_breach = self.session.meter.remaining();
            self.raise_corruption(to_breach);
        }
        self.run_attack_schedule(delta_ms);

        self.tick_outcome()
    }

    /// Lands one external hit. Ignored once the session is terminal.
    pub fn on_attack(&mut self, damage: u32) -> TickOutcome {
        if !self.state.is_terminal() {
            self.land_attack(damage);
        }
        self.tick_outcome()
    }

    fn run_attack_schedule(&mut self, delta_ms: u64) {
        let Some(attack) = self.config.attack else {
            return;
        };
        self.session.attack_carry_ms = self.session.attack_carry_ms.saturating_add(delta_ms);
        while self.session.attack_carry_ms >= attack.interval_ms && !self.state.is_terminal() {
            self.session.attack_carry_ms -= attack.interval_ms;
            self.land_attack(attack.damage);
        }
    }

    fn land_attack(&mut self, damage: u32) {
        info!(challenge = %self.config.name, damage, "attack_landed");
        self.events.emit(ChallengeEvent::AttackLanded { damage });
        self.raise_corruption(damage);
    }

    fn raise_corruption(&mut self, amount: u32) {
        let tier_before = self.session.meter.tier();
        let value_before = self.session.meter.value();
        let status = self.session.meter.increase(amount);

        if self.session.meter.value() != value_before {
            self.events.emit(ChallengeEvent::CorruptionRaised {
                value: self.session.meter.value(),
                percent: self.session.meter.percent(),
            });
        }
        let tier_after = self.session.meter.tier();
        if tier_after != tier_before {
            self.events.emit(ChallengeEvent::IntegrityTierChanged {
                from: tier_before,
                to: tier_after,
            });
        }

        if let IntegrityStatus::Breached { .. } = status {
            if !self.has_breached_once {
                self.has_breached_once = true;
                self.presented = None;
                self.transition(ChallengeState::Infected);
                self.events.emit(ChallengeEvent::ChallengeFailed);
            }
        }
    }

    /// Discards the session and starts a fresh one in `Idle`. The shuffle
    /// stream moves to the next generation so replays see new orderings.
    pub fn restart(&mut self) -> ChallengeState {
        let generation = self.session.generation.saturating_add(1);
        self.session = ChallengeSession::new(&self.config, generation);
        self.presented = None;
        self.has_breached_once = false;
        info!(challenge = %self.config.name, generation, "challenge_restarted");
        self.events
            .emit(ChallengeEvent::SessionRestarted { generation });
        self.transition(ChallengeState::Idle);
        self.state
    }

    fn present_current_step(&mut self) -> Result<Option<OptionSet>, OptionPoolError> {
        let step: Step = match self.session.sequencer.current() {
            Cursor::Step(step) => step.clone(),
            Cursor::Done => return Ok(None),
        };
        let serial = OptionSetSerial(self.next_serial);
        self.next_serial = self.next_serial.saturating_add(1);

        let session = &mut self.session;
        let set = match session
            .pool
            .next_option_set(&step, &session.used_command_ids, serial)
        {
            Ok(set) => set,
            Err(OptionPoolError::InsufficientDecoys {
                step_index,
                required,
                available,
            }) => {
                warn!(
                    challenge = %self.config.name,
                    step = step_index,
                    required,
                    available,
                    "insufficient_decoys_presenting_degraded_set"
                );
                session
                    .pool
                    .degraded_option_set(&step, &session.used_command_ids, serial)?
            }
            Err(error) => return Err(error),
        };

        self.events.emit(ChallengeEvent::OptionSetPresented {
            serial: set.serial,
            step_index: set.for_step_index,
            option_ids: set.option_ids(),
            degraded: set.is_degraded(),
        });
        self.presented = Some(PresentedSet {
            set: set.clone(),
            rejected: HashSet::new(),
        });
        Ok(Some(set))
    }

    fn transition(&mut self, to: ChallengeState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(
            challenge = %self.config.name,
            from = from.as_token(),
            to = to.as_token(),
            step = self.session.sequencer.current_index(),
            corruption = self.session.meter.value(),
            "challenge_state_changed"
        );
        self.events.emit(ChallengeEvent::StateChanged { from, to });
    }
}
