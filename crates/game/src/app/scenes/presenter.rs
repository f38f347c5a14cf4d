use std::collections::HashSet;
use std::io::{self, Write};

use challenge_engine::challenge::{ChallengeEvent, CommandId, OptionSet, SessionSnapshot};

const BAR_WIDTH: usize = 20;

/// Buffers text lines between renders. Scenes push; the loop drains.
#[derive(Debug, Default)]
pub(crate) struct Presenter {
    lines: Vec<String>,
}

impl Presenter {
    pub(crate) fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub(crate) fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub(crate) fn option_menu(
        &mut self,
        step_count: usize,
        set: &OptionSet,
        rejected: Option<&HashSet<CommandId>>,
    ) {
        self.line(format!(
            "Step {}/{}: pick the next line of the program",
            set.for_step_index + 1,
            step_count
        ));
        for (position, option) in set.options.iter().enumerate() {
            let struck = rejected.is_some_and(|rejected| rejected.contains(&option.id));
            let marker = if struck { "  (rejected)" } else { "" };
            self.line(format!(
                "  {}) {}{marker}",
                position + 1,
                option.display_text
            ));
        }
    }

    pub(crate) fn status(&mut self, prefix: &str, snapshot: &SessionSnapshot) {
        self.line(format!(
            "{prefix}threat {} {:>3}%  corruption {} {:>3}% ({})",
            meter_bar(snapshot.threat_ratio),
            percent(snapshot.threat_ratio),
            meter_bar(snapshot.corruption_percent),
            percent(snapshot.corruption_percent),
            snapshot.integrity_tier.as_token()
        ));
    }

    pub(crate) fn event(&mut self, prefix: &str, event: &ChallengeEvent) {
        if let Some(text) = event_line(event) {
            self.line(format!("{prefix}{text}"));
        }
    }

    pub(crate) fn render(&mut self, out: &mut dyn Write) -> io::Result<()> {
        for line in self.lines.drain(..) {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

/// Player-facing text for an event. Menus and raw meter updates are drawn
/// separately, so those events map to `None`.
pub(crate) fn event_line(event: &ChallengeEvent) -> Option<String> {
    match event {
        ChallengeEvent::AnswerAccepted { step_index, .. } => {
            Some(format!("+ line {} accepted", step_index + 1))
        }
        ChallengeEvent::AnswerRejected { .. } => {
            Some("x that line does not belong here, try another".to_string())
        }
        ChallengeEvent::AttackLanded { damage } => {
            Some(format!("! virus attack, corruption +{damage}"))
        }
        ChallengeEvent::IntegrityTierChanged { to, .. } => {
            Some(format!("! integrity now {}", to.as_token()))
        }
        ChallengeEvent::ChallengeCompleted => Some("* program complete".to_string()),
        ChallengeEvent::ChallengeFailed => {
            Some("!! system infected, type r to restart".to_string())
        }
        ChallengeEvent::SessionRestarted { generation } => {
            Some(format!("~ restarted, attempt {}", generation + 1))
        }
        ChallengeEvent::SubsystemRepaired { subsystem_id } => {
            Some(format!("* subsystem {subsystem_id} repaired"))
        }
        ChallengeEvent::AllSubsystemsRepaired => {
            Some("*** all subsystems repaired, circuit restored".to_string())
        }
        ChallengeEvent::OptionSetPresented { .. }
        | ChallengeEvent::CorruptionRaised { .. }
        | ChallengeEvent::StateChanged { .. } => None,
    }
}

fn percent(ratio: f32) -> u32 {
    (ratio.clamp(0.0, 1.0) * 100.0).round() as u32
}

fn meter_bar(ratio: f32) -> String {
    let filled = ((ratio.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}
