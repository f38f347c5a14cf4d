use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::command::{Command, CommandId, Step};

pub const DEFAULT_THRESHOLD_MS: u64 = 60_000;
pub const DEFAULT_REWARD_MS: u64 = 5_000;
pub const DEFAULT_MAX_CORRUPTION: u32 = 100;
pub const DEFAULT_CHALLENGE_NAME: &str = "challenge";

/// Periodic malware hits that add corruption directly, independent of the
/// threat clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSchedule {
    pub interval_ms: u64,
    pub damage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub steps: Vec<Step>,
    pub command_pool: Vec<Command>,
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,
    #[serde(default = "default_reward_ms")]
    pub reward_ms: u64,
    #[serde(default = "default_max_corruption")]
    pub max_corruption: u32,
    #[serde(default)]
    pub attack: Option<AttackSchedule>,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("challenge '{name}' has no steps")]
    EmptyProgram { name: String },
    #[error("challenge '{name}' has threshold_ms 0; the threat clock would expire immediately")]
    ZeroThreshold { name: String },
    #[error("challenge '{name}' has max_corruption 0")]
    ZeroMaxCorruption { name: String },
    #[error("challenge '{name}' has an attack schedule with interval_ms 0")]
    ZeroAttackInterval { name: String },
    #[error("challenge '{name}' step at position {position} carries index {index}")]
    StepIndexMismatch {
        name: String,
        position: usize,
        index: usize,
    },
    #[error("challenge '{name}' lists command '{command_id}' more than once in its pool")]
    DuplicateCommand { name: String, command_id: CommandId },
    #[error("challenge '{name}' step {step_index} expects '{command_id}' which is not in the pool")]
    MissingCommand {
        name: String,
        step_index: usize,
        command_id: CommandId,
    },
    #[error("challenge '{name}' step {step_index} expects decoy command '{command_id}'")]
    DecoyExpected {
        name: String,
        step_index: usize,
        command_id: CommandId,
    },
}

impl ChallengeConfig {
    pub fn new(steps: Vec<Step>, command_pool: Vec<Command>) -> Self {
        Self {
            name: default_name(),
            steps,
            command_pool,
            threshold_ms: DEFAULT_THRESHOLD_MS,
            reward_ms: DEFAULT_REWARD_MS,
            max_corruption: DEFAULT_MAX_CORRUPTION,
            attack: None,
            seed: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.threshold_ms = threshold_ms;
        self
    }

    pub fn with_reward_ms(mut self, reward_ms: u64) -> Self {
        self.reward_ms = reward_ms;
        self
    }

    pub fn with_max_corruption(mut self, max_corruption: u32) -> Self {
        self.max_corruption = max_corruption;
        self
    }

    pub fn with_attack(mut self, attack: AttackSchedule) -> Self {
        self.attack = Some(attack);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = || self.name.clone();
        if self.steps.is_empty() {
            return Err(ConfigError::EmptyProgram { name: name() });
        }
        if self.threshold_ms == 0 {
            return Err(ConfigError::ZeroThreshold { name: name() });
        }
        if self.max_corruption == 0 {
            return Err(ConfigError::ZeroMaxCorruption { name: name() });
        }
        if self.attack.is_some_and(|attack| attack.interval_ms == 0) {
            return Err(ConfigError::ZeroAttackInterval { name: name() });
        }

        let mut seen = HashSet::with_capacity(self.command_pool.len());
        let mut decoy_by_id = HashMap::with_capacity(self.command_pool.len());
        for command in &self.command_pool {
            if !seen.insert(&command.id) {
                return Err(ConfigError::DuplicateCommand {
                    name: name(),
                    command_id: command.id.clone(),
                });
            }
            decoy_by_id.insert(&command.id, command.is_decoy);
        }

        for (position, step) in self.steps.iter().enumerate() {
            if step.index != position {
                return Err(ConfigError::StepIndexMismatch {
                    name: name(),
                    position,
                    index: step.index,
                });
            }
            match decoy_by_id.get(&step.expected_command_id) {
                None => {
                    return Err(ConfigError::MissingCommand {
                        name: name(),
                        step_index: step.index,
                        command_id: step.expected_command_id.clone(),
                    })
                }
                Some(true) => {
                    return Err(ConfigError::DecoyExpected {
                        name: name(),
                        step_index: step.index,
                        command_id: step.expected_command_id.clone(),
                    })
                }
                Some(false) => {}
            }
        }
        Ok(())
    }
}

fn default_name() -> String {
    DEFAULT_CHALLENGE_NAME.to_string()
}

fn default_threshold_ms() -> u64 {
    DEFAULT_THRESHOLD_MS
}

fn default_reward_ms() -> u64 {
    DEFAULT_REWARD_MS
}

fn default_max_corruption() -> u32 {
    DEFAULT_MAX_CORRUPTION
}
