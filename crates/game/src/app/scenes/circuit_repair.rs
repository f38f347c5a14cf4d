use std::io::{self, Write};

use challenge_engine::challenge::{
    derive_session_seed, AggregatorHandle, ChallengeController, ChallengeEvent, ChallengeHost,
    ChallengeState, HostEventSource, SessionHandle, SubmitResult, SubsystemAggregator,
    SubsystemId,
};
use challenge_engine::{InputAction, InputSnapshot, Scene, SceneCommand, SceneKey, SceneResources};
use tracing::{info, warn};

use super::presenter::Presenter;
use super::program_builder::ignored_text;
use super::STATUS_EVERY_TICKS;

#[derive(Debug, Clone)]
struct RepairSlot {
    subsystem_id: SubsystemId,
    label: String,
    session: SessionHandle,
}

/// Several subsystems under attack at once, each its own timed challenge.
/// The circuit is restored when every subsystem has been repaired.
pub(crate) struct CircuitRepairScene {
    scene_def: String,
    switch_target: SceneKey,
    label: String,
    host: ChallengeHost,
    aggregator: Option<AggregatorHandle>,
    slots: Vec<RepairSlot>,
    focused: usize,
    presenter: Presenter,
    ticks_since_status: u32,
    restored: bool,
}

impl CircuitRepairScene {
    pub(crate) fn new(scene_def: impl Into<String>, switch_target: SceneKey) -> Self {
        let scene_def = scene_def.into();
        Self {
            label: scene_def.clone(),
            scene_def,
            switch_target,
            host: ChallengeHost::new(),
            aggregator: None,
            slots: Vec::new(),
            focused: 0,
            presenter: Presenter::default(),
            ticks_since_status: 0,
            restored: false,
        }
    }

    pub(crate) fn focused_controller(&self) -> Option<&ChallengeController> {
        let slot = self.slots.get(self.focused)?;
        self.host.controller(slot.session).ok()
    }

    #[cfg(test)]
    pub(crate) fn slot_controller(&self, index: usize) -> Option<&ChallengeController> {
        let slot = self.slots.get(index)?;
        self.host.controller(slot.session).ok()
    }

    pub(crate) fn aggregator(&self) -> Option<&SubsystemAggregator> {
        self.host.aggregator(self.aggregator?).ok()
    }

    #[cfg(test)]
    pub(crate) fn focused_index(&self) -> usize {
        self.focused
    }

    #[cfg(test)]
    pub(crate) fn is_restored(&self) -> bool {
        self.restored
    }

    fn build_slots(&mut self, resources: &SceneResources) -> Result<(), String> {
        let lessons = resources.lessons();
        let scene = lessons
            .repair_scene(&self.scene_def)
            .ok_or_else(|| format!("repair scene '{}' is not in the lesson database", self.scene_def))?;
        self.label = scene.label.clone();

        let aggregator = self.host.create_aggregator();
        self.aggregator = Some(aggregator);
        for (index, slot) in scene.subsystems.iter().enumerate() {
            let seed = derive_session_seed(resources.base_seed(), index as u64);
            let config = lessons
                .challenge_config(&slot.challenge, seed)
                .ok_or_else(|| format!("challenge '{}' is not in the lesson database", slot.challenge))?;
            let label = lessons
                .challenge(&slot.challenge)
                .map(|def| def.label.clone())
                .unwrap_or_else(|| slot.challenge.clone());

            let session = self
                .host
                .start_session(config)
                .map_err(|error| error.to_string())?
                .handle;
            self.host
                .register_subsystem(aggregator, slot.subsystem_id.clone())
                .and_then(|_| {
                    self.host
                        .link_subsystem(session, aggregator, slot.subsystem_id.clone())
                })
                .and_then(|_| self.host.present(session).map(|_| ()))
                .map_err(|error| error.to_string())?;
            self.slots.push(RepairSlot {
                subsystem_id: slot.subsystem_id.clone(),
                label,
                session,
            });
        }
        Ok(())
    }

    fn choose(&mut self, position: usize) {
        let Some(slot) = self.slots.get(self.focused).cloned() else {
            return;
        };
        let Some((serial, command_id)) = self.focused_controller().and_then(|controller| {
            let set = controller.current_option_set()?;
            let option = set.option_at(position.checked_sub(1)?)?;
            Some((set.serial, option.id.clone()))
        }) else {
            self.presenter.line(format!(
                "[{}] there is no option {position} right now",
                slot.subsystem_id
            ));
            return;
        };

        match self.host.submit_to(slot.session, serial, &command_id) {
            Ok(outcome) => {
                if let SubmitResult::Ignored(reason) = outcome.result {
                    self.presenter.line(format!(
                        "[{}] (ignored: {})",
                        slot.subsystem_id,
                        ignored_text(reason)
                    ));
                }
            }
            Err(error) => warn!(
                subsystem = %slot.subsystem_id,
                error = %error,
                "submit_failed"
            ),
        }
    }

    fn focus(&mut self, position: usize) {
        if position == 0 || position > self.slots.len() {
            self.presenter.line(format!(
                "there is no subsystem {position}; choose 1-{}",
                self.slots.len()
            ));
            return;
        }
        self.focused = position - 1;
        if let Some(slot) = self.slots.get(self.focused) {
            info!(subsystem = %slot.subsystem_id, "subsystem_focused");
        }
        self.draw_focus();
    }

    fn restart_focused(&mut self) {
        if self.restored {
            self.presenter.line("the circuit is already restored");
            return;
        }
        let Some(slot) = self.slots.get(self.focused).cloned() else {
            return;
        };
        if let Err(error) = self
            .host
            .restart(slot.session)
            .and_then(|_| self.host.present(slot.session))
        {
            warn!(subsystem = %slot.subsystem_id, error = %error, "restart_failed");
        }
    }

    fn slot_prefix(&self, session: SessionHandle) -> String {
        self.slots
            .iter()
            .find(|slot| slot.session == session)
            .map(|slot| format!("[{}] ", slot.subsystem_id))
            .unwrap_or_default()
    }

    fn present_events(&mut self) {
        let mut redraw_focus = false;
        let focused_session = self.slots.get(self.focused).map(|slot| slot.session);
        for host_event in self.host.drain_events() {
            let prefix = match host_event.source {
                HostEventSource::Session(session) => {
                    let is_focused = Some(session) == focused_session;
                    match &host_event.event {
                        ChallengeEvent::OptionSetPresented { .. }
                        | ChallengeEvent::AnswerRejected { .. }
                            if is_focused =>
                        {
                            redraw_focus = true;
                        }
                        _ => {}
                    }
                    self.slot_prefix(session)
                }
                HostEventSource::Aggregator(_) => String::new(),
            };
            if host_event.event == ChallengeEvent::AllSubsystemsRepaired {
                self.restored = true;
            }
            self.presenter.event(&prefix, &host_event.event);
        }
        if redraw_focus {
            self.draw_focused_menu();
        }
    }

    fn draw_board(&mut self) {
        let rows: Vec<String> = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let state = self
                    .host
                    .controller(slot.session)
                    .map(|controller| board_state(controller.state()))
                    .unwrap_or("missing");
                let cursor = if index == self.focused { ">" } else { " " };
                format!(
                    "{cursor} {}. {:<8} {:<24} {state}",
                    index + 1,
                    slot.subsystem_id.as_str(),
                    slot.label
                )
            })
            .collect();
        self.presenter.blank();
        self.presenter.line(format!("== {} ==", self.label));
        for row in rows {
            self.presenter.line(row);
        }
    }

    fn draw_focus(&mut self) {
        self.draw_board();
        self.draw_focused_menu();
    }

    fn draw_focused_menu(&mut self) {
        let Some(controller) = self.focused_controller() else {
            return;
        };
        let state = controller.state();
        let step_count = controller.session().sequencer().len();
        let set = controller.current_option_set().cloned();
        let rejected = controller.rejected_in_current_set().cloned();
        let prefix = self
            .slots
            .get(self.focused)
            .map(|slot| format!("[{}] ", slot.subsystem_id))
            .unwrap_or_default();

        match (state, set) {
            (ChallengeState::Presenting, Some(set)) => {
                self.presenter.blank();
                self.presenter.line(format!("{prefix}focused"));
                self.presenter
                    .option_menu(step_count, &set, rejected.as_ref());
            }
            (ChallengeState::Infected, _) => self
                .presenter
                .line(format!("{prefix}infected, type r to restart it")),
            (ChallengeState::AllStepsComplete, _) => {
                self.presenter.line(format!("{prefix}already repaired"))
            }
            _ => {}
        }
    }

    fn draw_status(&mut self) {
        let snapshots: Vec<(String, _)> = self
            .slots
            .iter()
            .filter_map(|slot| {
                let snapshot = self.host.snapshot(slot.session).ok()?;
                (snapshot.state == ChallengeState::Presenting)
                    .then(|| (format!("[{:<8}] ", slot.subsystem_id.as_str()), snapshot))
            })
            .collect();
        for (prefix, snapshot) in &snapshots {
            self.presenter.status(prefix, snapshot);
        }
    }

    fn help(&mut self) {
        self.presenter.line(
            "1-3 pick an option, s <n> focus subsystem n, r restart focused, x switch scene, q quit",
        );
    }
}

impl Scene for CircuitRepairScene {
    fn load(&mut self, resources: &SceneResources) {
        self.host = ChallengeHost::new();
        self.aggregator = None;
        self.slots.clear();
        self.focused = 0;
        self.ticks_since_status = 0;
        self.restored = false;

        if let Err(message) = self.build_slots(resources) {
            warn!(scene = %self.scene_def, error = %message, "circuit_repair_load_failed");
            self.presenter.line(format!("cannot load circuit repair: {message}"));
            return;
        }
        info!(
            scene = %self.label,
            subsystems = self.slots.len(),
            "circuit_repair_loaded"
        );
        // Opening menus are drawn by draw_focus below.
        let _ = self.host.drain_events();
        self.help();
        self.draw_focus();
    }

    fn update(&mut self, fixed_dt_ms: u64, input: &InputSnapshot) -> SceneCommand {
        for action in input.actions() {
            match *action {
                InputAction::Choose(position) => self.choose(position),
                InputAction::Focus(position) => self.focus(position),
                InputAction::Restart => self.restart_focused(),
                InputAction::Help => self.help(),
                InputAction::SwitchScene => {
                    self.present_events();
                    return SceneCommand::SwitchTo(self.switch_target);
                }
                InputAction::Quit => {
                    self.present_events();
                    return SceneCommand::Quit;
                }
            }
        }
        for line in input.unrecognized() {
            self.presenter
                .line(format!("unknown input '{line}', type h for help"));
        }

        if fixed_dt_ms > 0 && !self.restored {
            self.host.tick_all(fixed_dt_ms);
            self.ticks_since_status = self.ticks_since_status.saturating_add(1);
            if self.ticks_since_status >= STATUS_EVERY_TICKS {
                self.ticks_since_status = 0;
                self.draw_status();
            }
        }

        self.present_events();
        SceneCommand::None
    }

    fn render(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.presenter.render(out)
    }

    fn unload(&mut self) {
        for slot in self.slots.drain(..) {
            let _ = self.host.end_session(slot.session);
        }
        self.aggregator = None;
        info!(scene = %self.label, "circuit_repair_unloaded");
    }

    fn debug_title(&self) -> Option<String> {
        let aggregator = self.aggregator()?;
        Some(format!(
            "{} [{}/{} repaired]",
            self.label,
            aggregator.repaired_count(),
            aggregator.len()
        ))
    }
}

fn board_state(state: ChallengeState) -> &'static str {
    match state {
        ChallengeState::Idle => "waiting",
        ChallengeState::Presenting => "under attack",
        ChallengeState::AllStepsComplete => "repaired",
        ChallengeState::Infected => "infected",
    }
}
