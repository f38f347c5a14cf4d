use serde::Serialize;

use super::command::{CommandId, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor<'a> {
    Step(&'a Step),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSequencer {
    steps: Vec<Step>,
    current_index: usize,
}

impl StepSequencer {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            current_index: 0,
        }
    }

    pub fn current(&self) -> Cursor<'_> {
        match self.steps.get(self.current_index) {
            Some(step) => Cursor::Step(step),
            None => Cursor::Done,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_done(&self) -> bool {
        self.current_index >= self.steps.len()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Advances by exactly one on a match. A finished sequence has no
    /// expected command, so every submission is `Incorrect`.
    pub fn submit(&mut self, command_id: &CommandId) -> Submission {
        let Cursor::Step(step) = self.current() else {
            return Submission::Incorrect;
        };
        if &step.expected_command_id != command_id {
            return Submission::Incorrect;
        }
        self.current_index += 1;
        Submission::Correct
    }
}
