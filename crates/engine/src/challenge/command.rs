use std::fmt;

use serde::{Deserialize, Serialize};

pub const OPTIONS_PER_SET: usize = 3;
pub const DECOYS_PER_SET: usize = OPTIONS_PER_SET - 1;
pub const DEFAULT_COMMAND_CATEGORY: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CommandId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One selectable line of the target program.
///
/// `category` is carried for presentation grouping only and never influences
/// validation or decoy selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub display_text: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub is_decoy: bool,
}

impl Command {
    pub fn new(id: impl Into<CommandId>, display_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_text: display_text.into(),
            category: default_category(),
            is_decoy: false,
        }
    }

    pub fn decoy(id: impl Into<CommandId>, display_text: impl Into<String>) -> Self {
        Self {
            is_decoy: true,
            ..Self::new(id, display_text)
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

fn default_category() -> String {
    DEFAULT_COMMAND_CATEGORY.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub expected_command_id: CommandId,
}

impl Step {
    pub fn program<I, C>(expected_ids: I) -> Vec<Step>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandId>,
    {
        expected_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| Step {
                index,
                expected_command_id: id.into(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionSetSerial(pub u64);

impl fmt::Display for OptionSetSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "set#{}", self.0)
    }
}

/// Options offered for one step. Exactly one member carries
/// `correct_command_id` and no id appears twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSet {
    pub serial: OptionSetSerial,
    pub for_step_index: usize,
    pub options: Vec<Command>,
    pub correct_command_id: CommandId,
}

impl OptionSet {
    pub fn contains(&self, id: &CommandId) -> bool {
        self.options.iter().any(|option| &option.id == id)
    }

    pub fn option_at(&self, position: usize) -> Option<&Command> {
        self.options.get(position)
    }

    pub fn option_ids(&self) -> Vec<CommandId> {
        self.options.iter().map(|option| option.id.clone()).collect()
    }

    pub fn correct_position(&self) -> Option<usize> {
        self.options
            .iter()
            .position(|option| option.id == self.correct_command_id)
    }

    pub fn is_degraded(&self) -> bool {
        self.options.len() < OPTIONS_PER_SET
    }
}
