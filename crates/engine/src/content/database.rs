use std::collections::{BTreeMap, HashSet};

use crate::challenge::{
    AttackSchedule, ChallengeConfig, Command, CommandId, Step, SubsystemId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDef {
    pub def_name: String,
    pub label: String,
    pub program: Vec<CommandId>,
    pub decoys: Vec<CommandId>,
    pub threshold_ms: u64,
    pub reward_ms: u64,
    pub max_corruption: u32,
    pub attack: Option<AttackSchedule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSlotDef {
    pub subsystem_id: SubsystemId,
    pub challenge: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSceneDef {
    pub def_name: String,
    pub label: String,
    pub subsystems: Vec<RepairSlotDef>,
}

/// Compiled lesson content. Every reference between defs has been resolved,
/// so configs built from it always validate.
#[derive(Debug, Default, Clone)]
pub struct LessonDatabase {
    commands: BTreeMap<CommandId, Command>,
    challenges: BTreeMap<String, ChallengeDef>,
    repair_scenes: BTreeMap<String, RepairSceneDef>,
}

impl LessonDatabase {
    pub(crate) fn from_defs(
        commands: BTreeMap<CommandId, Command>,
        challenges: BTreeMap<String, ChallengeDef>,
        repair_scenes: BTreeMap<String, RepairSceneDef>,
    ) -> Self {
        Self {
            commands,
            challenges,
            repair_scenes,
        }
    }

    pub fn command(&self, id: &CommandId) -> Option<&Command> {
        self.commands.get(id)
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn challenge(&self, def_name: &str) -> Option<&ChallengeDef> {
        self.challenges.get(def_name)
    }

    pub fn challenge_names(&self) -> impl Iterator<Item = &str> {
        self.challenges.keys().map(String::as_str)
    }

    pub fn repair_scene(&self, def_name: &str) -> Option<&RepairSceneDef> {
        self.repair_scenes.get(def_name)
    }

    pub fn repair_scene_names(&self) -> impl Iterator<Item = &str> {
        self.repair_scenes.keys().map(String::as_str)
    }

    /// Pool order is program commands first, then decoys, each id once.
    pub fn challenge_config(&self, def_name: &str, seed: u64) -> Option<ChallengeConfig> {
        let def = self.challenges.get(def_name)?;
        let mut seen = HashSet::new();
        let mut pool = Vec::with_capacity(def.program.len() + def.decoys.len());
        for id in def.program.iter().chain(def.decoys.iter()) {
            if !seen.insert(id) {
                continue;
            }
            pool.push(self.commands.get(id)?.clone());
        }

        let mut config = ChallengeConfig::new(Step::program(def.program.iter().cloned()), pool)
            .with_name(def.def_name.clone())
            .with_threshold_ms(def.threshold_ms)
            .with_reward_ms(def.reward_ms)
            .with_max_corruption(def.max_corruption)
            .with_seed(seed);
        config.attack = def.attack;
        Some(config)
    }
}
