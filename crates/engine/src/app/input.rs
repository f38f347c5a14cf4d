/// One parsed line of player input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    /// Pick the option at a 1-based position in the visible set.
    Choose(usize),
    /// Focus the 1-based subsystem slot in a multi-challenge scene.
    Focus(usize),
    Restart,
    SwitchScene,
    Help,
    Quit,
}

impl InputAction {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let head = words.next()?;
        let arg = words.next();
        if words.next().is_some() {
            return None;
        }

        match (head.to_ascii_lowercase().as_str(), arg) {
            ("q" | "quit" | "exit", None) => Some(Self::Quit),
            ("r" | "restart", None) => Some(Self::Restart),
            ("x" | "switch", None) => Some(Self::SwitchScene),
            ("h" | "help" | "?", None) => Some(Self::Help),
            ("s" | "focus", Some(slot)) => parse_position(slot).map(Self::Focus),
            (choice, None) => parse_position(choice).map(Self::Choose),
            _ => None,
        }
    }
}

fn parse_position(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok().filter(|position| *position > 0)
}

/// Input gathered between two ticks, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    actions: Vec<InputAction>,
    unrecognized: Vec<String>,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshot = Self::default();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            match InputAction::parse(line) {
                Some(action) => snapshot.actions.push(action),
                None => snapshot.unrecognized.push(line.to_string()),
            }
        }
        snapshot
    }

    pub fn with_action(mut self, action: InputAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(&self) -> &[InputAction] {
        &self.actions
    }

    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }

    pub fn quit_requested(&self) -> bool {
        self.actions.contains(&InputAction::Quit)
    }

    pub fn switch_scene_pressed(&self) -> bool {
        self.actions.contains(&InputAction::SwitchScene)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.unrecognized.is_empty()
    }
}
