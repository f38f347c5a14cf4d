use std::io::{self, Write};

use challenge_engine::challenge::{
    ChallengeController, ChallengeEvent, ChallengeHost, ChallengeState, IgnoredSubmit,
    SessionHandle, SubmitResult,
};
use challenge_engine::{InputAction, InputSnapshot, Scene, SceneCommand, SceneKey, SceneResources};
use tracing::{info, warn};

use super::presenter::Presenter;
use super::STATUS_EVERY_TICKS;

/// One timed challenge: build a program line by line before the virus wins.
pub(crate) struct ProgramBuilderScene {
    lesson: String,
    switch_target: SceneKey,
    label: String,
    host: ChallengeHost,
    session: Option<SessionHandle>,
    presenter: Presenter,
    ticks_since_status: u32,
}

impl ProgramBuilderScene {
    pub(crate) fn new(lesson: impl Into<String>, switch_target: SceneKey) -> Self {
        let lesson = lesson.into();
        Self {
            label: lesson.clone(),
            lesson,
            switch_target,
            host: ChallengeHost::new(),
            session: None,
            presenter: Presenter::default(),
            ticks_since_status: 0,
        }
    }

    pub(crate) fn controller(&self) -> Option<&ChallengeController> {
        let handle = self.session?;
        self.host.controller(handle).ok()
    }

    fn choose(&mut self, position: usize) {
        let Some(handle) = self.session else {
            return;
        };
        let Some((serial, command_id)) = self.controller().and_then(|controller| {
            let set = controller.current_option_set()?;
            let option = set.option_at(position.checked_sub(1)?)?;
            Some((set.serial, option.id.clone()))
        }) else {
            self.presenter
                .line(format!("there is no option {position} right now"));
            return;
        };

        match self.host.submit_to(handle, serial, &command_id) {
            Ok(outcome) => {
                if let SubmitResult::Ignored(reason) = outcome.result {
                    self.presenter
                        .line(format!("(ignored: {})", ignored_text(reason)));
                }
            }
            Err(error) => warn!(scene = %self.label, error = %error, "submit_failed"),
        }
    }

    fn restart(&mut self) {
        let Some(handle) = self.session else {
            return;
        };
        if let Err(error) = self
            .host
            .restart(handle)
            .and_then(|_| self.host.present(handle))
        {
            warn!(scene = %self.label, error = %error, "restart_failed");
        }
        self.ticks_since_status = 0;
    }

    /// Turns drained host events into text. A new option set or a rejected
    /// answer redraws the menu from the controller.
    fn present_events(&mut self) {
        let mut redraw_menu = false;
        for host_event in self.host.drain_events() {
            match &host_event.event {
                ChallengeEvent::OptionSetPresented { .. } => redraw_menu = true,
                event @ ChallengeEvent::AnswerRejected { .. } => {
                    self.presenter.event("", event);
                    redraw_menu = true;
                }
                event => self.presenter.event("", event),
            }
        }
        if redraw_menu {
            self.draw_menu();
        }
    }

    fn draw_menu(&mut self) {
        let Some(controller) = self.controller() else {
            return;
        };
        let Some(set) = controller.current_option_set().cloned() else {
            return;
        };
        let step_count = controller.session().sequencer().len();
        let rejected = controller.rejected_in_current_set().cloned();
        self.presenter.blank();
        self.presenter
            .option_menu(step_count, &set, rejected.as_ref());
    }

    fn draw_status(&mut self) {
        if let Some(snapshot) = self.controller().map(ChallengeController::snapshot) {
            self.presenter.status("", &snapshot);
        }
    }

    fn help(&mut self) {
        self.presenter
            .line("1-3 pick an option, r restart, x switch scene, q quit");
    }
}

impl Scene for ProgramBuilderScene {
    fn load(&mut self, resources: &SceneResources) {
        self.host = ChallengeHost::new();
        self.session = None;
        self.ticks_since_status = 0;

        let lessons = resources.lessons();
        let Some(config) = lessons.challenge_config(&self.lesson, resources.base_seed()) else {
            warn!(lesson = %self.lesson, "lesson_not_found");
            self.presenter
                .line(format!("lesson '{}' is not in the lesson database", self.lesson));
            return;
        };
        if let Some(def) = lessons.challenge(&self.lesson) {
            self.label = def.label.clone();
        }

        match self.host.start_session(config) {
            Ok(started) => {
                self.session = Some(started.handle);
                info!(scene = %self.label, session = %started.handle, "program_builder_loaded");
            }
            Err(error) => {
                warn!(lesson = %self.lesson, error = %error, "session_start_failed");
                self.presenter.line(format!("cannot start lesson: {error}"));
                return;
            }
        }

        self.presenter.line(format!("== {} ==", self.label));
        self.help();
        if let Some(handle) = self.session {
            if let Err(error) = self.host.present(handle) {
                warn!(scene = %self.label, error = %error, "present_failed");
            }
        }
        self.present_events();
    }

    fn update(&mut self, fixed_dt_ms: u64, input: &InputSnapshot) -> SceneCommand {
        for action in input.actions() {
            match *action {
                InputAction::Choose(position) => self.choose(position),
                InputAction::Restart => self.restart(),
                InputAction::Help => self.help(),
                InputAction::Focus(_) => self
                    .presenter
                    .line("this scene has a single program; focus is not available"),
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

        if fixed_dt_ms > 0 {
            if let Some(handle) = self.session {
                if let Ok(outcome) = self.host.tick(handle, fixed_dt_ms) {
                    self.ticks_since_status = self.ticks_since_status.saturating_add(1);
                    if outcome.state_now == ChallengeState::Presenting
                        && self.ticks_since_status >= STATUS_EVERY_TICKS
                    {
                        self.ticks_since_status = 0;
                        self.draw_status();
                    }
                }
            }
        }

        self.present_events();
        SceneCommand::None
    }

    fn render(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.presenter.render(out)
    }

    fn unload(&mut self) {
        if let Some(handle) = self.session.take() {
            let _ = self.host.end_session(handle);
        }
        info!(scene = %self.label, "program_builder_unloaded");
    }

    fn debug_title(&self) -> Option<String> {
        let controller = self.controller()?;
        Some(format!(
            "{} [{}]",
            self.label,
            controller.state().as_token()
        ))
    }
}

pub(super) fn ignored_text(reason: IgnoredSubmit) -> &'static str {
    match reason {
        IgnoredSubmit::NotPresenting => "no step is waiting for an answer",
        IgnoredSubmit::AlreadyRejected => "that option was already rejected",
        IgnoredSubmit::StaleOptionSet => "that menu is no longer current",
    }
}
