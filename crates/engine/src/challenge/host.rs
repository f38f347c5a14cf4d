use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::aggregator::{AggregatorError, ReportOutcome, SubsystemAggregator, SubsystemId};
use super::command::{CommandId, OptionSet, OptionSetSerial};
use super::config::{ChallengeConfig, ConfigError};
use super::controller::{
    ChallengeController, ChallengeState, SessionSnapshot, SubmitOutcome, TickOutcome,
};
use super::events::ChallengeEvent;
use super::option_pool::OptionPoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AggregatorHandle(pub u64);

impl fmt::Display for AggregatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aggregator#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown session handle {0}")]
    UnknownSession(SessionHandle),
    #[error("unknown aggregator handle {0}")]
    UnknownAggregator(AggregatorHandle),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    OptionPool(#[from] OptionPoolError),
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "handle", rename_all = "snake_case")]
pub enum HostEventSource {
    Session(SessionHandle),
    Aggregator(AggregatorHandle),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostEvent {
    pub source: HostEventSource,
    pub event: ChallengeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStarted {
    pub handle: SessionHandle,
    pub state_now: ChallengeState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentOutcome {
    pub option_set: Option<OptionSet>,
    pub state_now: ChallengeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestartOutcome {
    pub state_now: ChallengeState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubsystemLink {
    aggregator: AggregatorHandle,
    subsystem_id: SubsystemId,
}

#[derive(Debug)]
struct HostedSession {
    controller: ChallengeController,
    link: Option<SubsystemLink>,
}

/// Handle-based facade the presentation layer talks to.
///
/// Owns every live session and aggregator. Ending a session drops it and any
/// events it had not yet delivered.
#[derive(Debug, Default)]
pub struct ChallengeHost {
    sessions: BTreeMap<SessionHandle, HostedSession>,
    aggregators: BTreeMap<AggregatorHandle, SubsystemAggregator>,
    next_session: u64,
    next_aggregator: u64,
}

impl ChallengeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&mut self, config: ChallengeConfig) -> Result<SessionStarted, HostError> {
        let controller = ChallengeController::new(config)?;
        let handle = SessionHandle(self.next_session);
        self.next_session = self.next_session.saturating_add(1);
        info!(session = %handle, challenge = %controller.config().name, "host_session_started");
        let state_now = controller.state();
        self.sessions.insert(
            handle,
            HostedSession {
                controller,
                link: None,
            },
        );
        Ok(SessionStarted { handle, state_now })
    }

    pub fn end_session(&mut self, handle: SessionHandle) -> Result<(), HostError> {
        self.sessions
            .remove(&handle)
            .map(|_| info!(session = %handle, "host_session_ended"))
            .ok_or(HostError::UnknownSession(handle))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn controller(&self, handle: SessionHandle) -> Result<&ChallengeController, HostError> {
        self.sessions
            .get(&handle)
            .map(|hosted| &hosted.controller)
            .ok_or(HostError::UnknownSession(handle))
    }

    pub fn snapshot(&self, handle: SessionHandle) -> Result<SessionSnapshot, HostError> {
        self.controller(handle).map(ChallengeController::snapshot)
    }

    pub fn present(&mut self, handle: SessionHandle) -> Result<PresentOutcome, HostError> {
        let controller = self.controller_mut(handle)?;
        let option_set = controller.present()?;
        Ok(PresentOutcome {
            option_set,
            state_now: controller.state(),
        })
    }

    pub fn submit(
        &mut self,
        handle: SessionHandle,
        command_id: &CommandId,
    ) -> Result<SubmitOutcome, HostError> {
        self.submit_inner(handle, None, command_id)
    }

    pub fn submit_to(
        &mut self,
        handle: SessionHandle,
        serial: OptionSetSerial,
        command_id: &CommandId,
    ) -> Result<SubmitOutcome, HostError> {
        self.submit_inner(handle, Some(serial), command_id)
    }

    fn submit_inner(
        &mut self,
        handle: SessionHandle,
        serial: Option<OptionSetSerial>,
        command_id: &CommandId,
    ) -> Result<SubmitOutcome, HostError> {
        let hosted = self
            .sessions
            .get_mut(&handle)
            .ok_or(HostError::UnknownSession(handle))?;
        let state_before = hosted.controller.state();
        let outcome = match serial {
            Some(serial) => hosted.controller.submit_to(serial, command_id)?,
            None => hosted.controller.submit(command_id)?,
        };
        let completed_now = state_before != ChallengeState::AllStepsComplete
            && outcome.state_now == ChallengeState::AllStepsComplete;
        if completed_now {
            if let Some(link) = hosted.link.clone() {
                self.report_link(handle, &link)?;
            }
        }
        Ok(outcome)
    }

    pub fn tick(&mut self, handle: SessionHandle, delta_ms: u64) -> Result<TickOutcome, HostError> {
        Ok(self.controller_mut(handle)?.on_tick(delta_ms))
    }

    /// Ticks every live session by the same amount, in handle order.
    pub fn tick_all(&mut self, delta_ms: u64) -> Vec<(SessionHandle, TickOutcome)> {
        self.sessions
            .iter_mut()
            .map(|(handle, hosted)| (*handle, hosted.controller.on_tick(delta_ms)))
            .collect()
    }

    pub fn attack(&mut self, handle: SessionHandle, damage: u32) -> Result<TickOutcome, HostError> {
        Ok(self.controller_mut(handle)?.on_attack(damage))
    }

    pub fn restart(&mut self, handle: SessionHandle) -> Result<RestartOutcome, HostError> {
        let state_now = self.controller_mut(handle)?.restart();
        Ok(RestartOutcome { state_now })
    }

    pub fn create_aggregator(&mut self) -> AggregatorHandle {
        let handle = AggregatorHandle(self.next_aggregator);
        self.next_aggregator = self.next_aggregator.saturating_add(1);
        self.aggregators
            .insert(handle, SubsystemAggregator::new());
        handle
    }

    pub fn aggregator(&self, handle: AggregatorHandle) -> Result<&SubsystemAggregator, HostError> {
        self.aggregators
            .get(&handle)
            .ok_or(HostError::UnknownAggregator(handle))
    }

    pub fn register_subsystem(
        &mut self,
        handle: AggregatorHandle,
        subsystem_id: SubsystemId,
    ) -> Result<(), HostError> {
        self.aggregator_mut(handle)?.register(subsystem_id)?;
        Ok(())
    }

    pub fn report_subsystem(
        &mut self,
        handle: AggregatorHandle,
        subsystem_id: &SubsystemId,
        repaired: bool,
    ) -> Result<ReportOutcome, HostError> {
        let outcome = self
            .aggregator_mut(handle)?
            .report(subsystem_id, repaired)
            .map_err(|error| {
                warn!(aggregator = %handle, subsystem = %subsystem_id, %error, "subsystem_report_rejected");
                error
            })?;
        Ok(outcome)
    }

    /// Binds a session to an aggregator slot so reaching `AllStepsComplete`
    /// reports the subsystem repaired. Linking an already complete session
    /// reports immediately.
    pub fn link_subsystem(
        &mut self,
        session: SessionHandle,
        aggregator: AggregatorHandle,
        subsystem_id: SubsystemId,
    ) -> Result<(), HostError> {
        if !self.aggregator(aggregator)?.is_registered(&subsystem_id) {
            return Err(AggregatorError::UnknownSubsystem(subsystem_id).into());
        }
        let link = SubsystemLink {
            aggregator,
            subsystem_id,
        };
        let hosted = self
            .sessions
            .get_mut(&session)
            .ok_or(HostError::UnknownSession(session))?;
        hosted.link = Some(link.clone());
        if hosted.controller.state() == ChallengeState::AllStepsComplete {
            self.report_link(session, &link)?;
        }
        Ok(())
    }

    fn report_link(&mut self, session: SessionHandle, link: &SubsystemLink) -> Result<(), HostError> {
        let outcome = self.report_subsystem(link.aggregator, &link.subsystem_id, true)?;
        info!(
            session = %session,
            aggregator = %link.aggregator,
            subsystem = %link.subsystem_id,
            all_repaired = outcome.all_repaired,
            "linked_subsystem_reported"
        );
        Ok(())
    }

    /// Pending events from every session (handle order) followed by every
    /// aggregator (handle order).
    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        let mut drained = Vec::new();
        for (handle, hosted) in &mut self.sessions {
            drained.extend(hosted.controller.drain_events().into_iter().map(|event| {
                HostEvent {
                    source: HostEventSource::Session(*handle),
                    event,
                }
            }));
        }
        for (handle, aggregator) in &mut self.aggregators {
            drained.extend(aggregator.drain_events().into_iter().map(|event| HostEvent {
                source: HostEventSource::Aggregator(*handle),
                event,
            }));
        }
        drained
    }

    fn controller_mut(
        &mut self,
        handle: SessionHandle,
    ) -> Result<&mut ChallengeController, HostError> {
        self.sessions
            .get_mut(&handle)
            .map(|hosted| &mut hosted.controller)
            .ok_or(HostError::UnknownSession(handle))
    }

    fn aggregator_mut(
        &mut self,
        handle: AggregatorHandle,
    ) -> Result<&mut SubsystemAggregator, HostError> {
        self.aggregators
            .get_mut(&handle)
            .ok_or(HostError::UnknownAggregator(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::command::{Command, Step};

    fn one_step_config(name: &str) -> ChallengeConfig {
        ChallengeConfig::new(
            Step::program(["fix"]),
            vec![
                Command::new("fix", "digitalWrite(7, HIGH);"),
                Command::decoy("noise_a", "noTone(8);"),
                Command::decoy("noise_b", "delay(5);"),
            ],
        )
        .with_name(name)
    }

    fn solve(host: &mut ChallengeHost, handle: SessionHandle) -> SubmitOutcome {
        let set = host
            .present(handle)
            .expect("present")
            .option_set
            .expect("set");
        host.submit(handle, &set.correct_command_id).expect("submit")
    }

    #[test]
    fn unknown_handles_are_errors() {
        let mut host = ChallengeHost::new();
        assert!(matches!(
            host.tick(SessionHandle(9), 1_000),
            Err(HostError::UnknownSession(SessionHandle(9)))
        ));
        assert!(matches!(
            host.report_subsystem(AggregatorHandle(4), &SubsystemId::from("x"), true),
            Err(HostError::UnknownAggregator(AggregatorHandle(4)))
        ));
    }

    #[test]
    fn linked_sessions_complete_the_aggregator_once() {
        let mut host = ChallengeHost::new();
        let aggregator = host.create_aggregator();
        let mut sessions = Vec::new();
        for name in ["power", "sensor", "actuator", "logic"] {
            host.register_subsystem(aggregator, SubsystemId::from(name))
                .expect("register");
            let started = host.start_session(one_step_config(name)).expect("start");
            assert_eq!(started.state_now, ChallengeState::Idle);
            host.link_subsystem(started.handle, aggregator, SubsystemId::from(name))
                .expect("link");
            sessions.push(started.handle);
        }

        for handle in &sessions[..3] {
            assert_eq!(solve(&mut host, *handle).state_now, ChallengeState::AllStepsComplete);
        }
        assert!(!host.aggregator(aggregator).expect("agg").is_all_repaired());

        solve(&mut host, sessions[3]);
        assert!(host.aggregator(aggregator).expect("agg").is_all_repaired());

        let events = host.drain_events();
        let all_repaired = events
            .iter()
            .filter(|event| matches!(event.event, ChallengeEvent::AllSubsystemsRepaired))
            .count();
        assert_eq!(all_repaired, 1);
        assert!(events.iter().any(|event| event.source
            == HostEventSource::Session(sessions[0])
            && matches!(event.event, ChallengeEvent::ChallengeCompleted)));
    }

    #[test]
    fn attacks_through_a_handle_infect_only_that_session() {
        let mut host = ChallengeHost::new();
        let target = host.start_session(one_step_config("target")).expect("start").handle;
        let bystander = host.start_session(one_step_config("bystander")).expect("start").handle;
        host.present(target).expect("present");
        host.present(bystander).expect("present");
        host.drain_events();

        let first = host.attack(target, 40).expect("attack");
        assert_eq!(first.state_now, ChallengeState::Presenting);
        assert_eq!(first.corruption_percent, 0.4);
        host.attack(target, 40).expect("attack");
        let last = host.attack(target, 40).expect("attack");
        assert_eq!(last.state_now, ChallengeState::Infected);
        assert_eq!(last.corruption_percent, 1.0);

        let events = host.drain_events();
        assert!(events
            .iter()
            .all(|event| event.source == HostEventSource::Session(target)));
        let landed = events
            .iter()
            .filter(|event| matches!(event.event, ChallengeEvent::AttackLanded { damage: 40 }))
            .count();
        assert_eq!(landed, 3);
        let failed = events
            .iter()
            .filter(|event| event.event == ChallengeEvent::ChallengeFailed)
            .count();
        assert_eq!(failed, 1);

        host.attack(target, 40).expect("late attack");
        assert!(host.drain_events().is_empty());
        assert_eq!(
            host.snapshot(bystander).expect("bystander").corruption_value,
            0
        );
        assert!(matches!(
            host.attack(SessionHandle(99), 10),
            Err(HostError::UnknownSession(SessionHandle(99)))
        ));
    }

    #[test]
    fn link_to_unregistered_subsystem_is_rejected() {
        let mut host = ChallengeHost::new();
        let aggregator = host.create_aggregator();
        let started = host.start_session(one_step_config("x")).expect("start");
        let err = host
            .link_subsystem(started.handle, aggregator, SubsystemId::from("ghost"))
            .expect_err("unregistered");
        assert!(matches!(
            err,
            HostError::Aggregator(AggregatorError::UnknownSubsystem(_))
        ));
    }

    #[test]
    fn unknown_subsystem_report_leaves_aggregator_untouched() {
        let mut host = ChallengeHost::new();
        let aggregator = host.create_aggregator();
        host.register_subsystem(aggregator, SubsystemId::from("power"))
            .expect("register");
        let err = host
            .report_subsystem(aggregator, &SubsystemId::from("wifi"), true)
            .expect_err("unknown");
        assert!(matches!(err, HostError::Aggregator(_)));
        assert_eq!(host.aggregator(aggregator).expect("agg").repaired_count(), 0);
    }

    #[test]
    fn end_session_discards_it() {
        let mut host = ChallengeHost::new();
        let started = host.start_session(one_step_config("x")).expect("start");
        assert_eq!(host.session_count(), 1);
        host.end_session(started.handle).expect("end");
        assert_eq!(host.session_count(), 0);
        assert!(host.snapshot(started.handle).is_err());
    }

    #[test]
    fn invalid_config_does_not_allocate_a_session() {
        let mut host = ChallengeHost::new();
        let err = host
            .start_session(one_step_config("bad").with_max_corruption(0))
            .expect_err("invalid");
        assert!(matches!(err, HostError::Config(ConfigError::ZeroMaxCorruption { .. })));
        assert_eq!(host.session_count(), 0);
    }
}
