use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use thiserror::Error;

use super::command::{Command, CommandId, OptionSet, OptionSetSerial, Step, DECOYS_PER_SET};
use super::rng::ChallengeRng;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionPoolError {
    #[error("step {step_index} expects command '{command_id}' which is not in the pool")]
    UnknownCommand {
        step_index: usize,
        command_id: CommandId,
    },
    #[error("step {step_index} needs {required} decoys but the pool only holds {available}")]
    InsufficientDecoys {
        step_index: usize,
        required: usize,
        available: usize,
    },
}

#[derive(Debug, Clone)]
pub struct OptionPool {
    commands: Vec<Command>,
    index_by_id: HashMap<CommandId, usize>,
    rng: ChallengeRng,
}

impl OptionPool {
    /// Later duplicates of an id are dropped; config validation rejects them
    /// before a pool is ever built from user content.
    pub fn new(commands: Vec<Command>, rng: ChallengeRng) -> Self {
        let mut unique = Vec::with_capacity(commands.len());
        let mut index_by_id = HashMap::with_capacity(commands.len());
        for command in commands {
            if index_by_id.contains_key(&command.id) {
                continue;
            }
            index_by_id.insert(command.id.clone(), unique.len());
            unique.push(command);
        }
        Self {
            commands: unique,
            index_by_id,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn command(&self, id: &CommandId) -> Option<&Command> {
        self.index_by_id
            .get(id)
            .and_then(|index| self.commands.get(*index))
    }

    pub fn rng_draws(&self) -> u64 {
        self.rng.draws()
    }

    /// Draws the correct command plus exactly two decoys and shuffles them.
    ///
    /// Decoys come from commands outside `exclude_used` while enough of them
    /// remain; otherwise used commands fill the gap.
    pub fn next_option_set(
        &mut self,
        step: &Step,
        exclude_used: &HashSet<CommandId>,
        serial: OptionSetSerial,
    ) -> Result<OptionSet, OptionPoolError> {
        let correct_index = self.correct_index(step)?;
        let candidates = self.decoy_candidates(correct_index);
        if candidates.len() < DECOYS_PER_SET {
            return Err(OptionPoolError::InsufficientDecoys {
                step_index: step.index,
                required: DECOYS_PER_SET,
                available: candidates.len(),
            });
        }
        let decoys = self.draw_decoys(&candidates, exclude_used, DECOYS_PER_SET);
        Ok(self.assemble(step, correct_index, decoys, serial))
    }

    /// Degraded draw for pools too small for a full set: every available
    /// decoy, up to two, alongside the correct command.
    pub fn degraded_option_set(
        &mut self,
        step: &Step,
        exclude_used: &HashSet<CommandId>,
        serial: OptionSetSerial,
    ) -> Result<OptionSet, OptionPoolError> {
        let correct_index = self.correct_index(step)?;
        let candidates = self.decoy_candidates(correct_index);
        let count = candidates.len().min(DECOYS_PER_SET);
        let decoys = self.draw_decoys(&candidates, exclude_used, count);
        Ok(self.assemble(step, correct_index, decoys, serial))
    }

    fn correct_index(&self, step: &Step) -> Result<usize, OptionPoolError> {
        self.index_by_id
            .get(&step.expected_command_id)
            .copied()
            .ok_or_else(|| OptionPoolError::UnknownCommand {
                step_index: step.index,
                command_id: step.expected_command_id.clone(),
            })
    }

    fn decoy_candidates(&self, correct_index: usize) -> Vec<usize> {
        (0..self.commands.len())
            .filter(|index| *index != correct_index)
            .collect()
    }

    fn draw_decoys(
        &mut self,
        candidates: &[usize],
        exclude_used: &HashSet<CommandId>,
        count: usize,
    ) -> Vec<usize> {
        let (fresh, used): (Vec<usize>, Vec<usize>) = candidates
            .iter()
            .copied()
            .partition(|index| !exclude_used.contains(&self.commands[*index].id));

        if fresh.len() >= count {
            return fresh
                .choose_multiple(&mut self.rng, count)
                .copied()
                .collect();
        }

        let mut picked = fresh;
        let shortfall = count - picked.len();
        picked.extend(used.choose_multiple(&mut self.rng, shortfall).copied());
        picked
    }

    fn assemble(
        &mut self,
        step: &Step,
        correct_index: usize,
        decoys: Vec<usize>,
        serial: OptionSetSerial,
    ) -> OptionSet {
        let mut picked = Vec::with_capacity(decoys.len() + 1);
        picked.push(correct_index);
        picked.extend(decoys);
        picked.shuffle(&mut self.rng);

        OptionSet {
            serial,
            for_step_index: step.index,
            options: picked
                .into_iter()
                .map(|index| self.commands[index].clone())
                .collect(),
            correct_command_id: self.commands[correct_index].id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blink_pool(seed: u64) -> OptionPool {
        OptionPool::new(
            vec![
                Command::new("pin_mode", "pinMode(13, OUTPUT);"),
                Command::new("led_on", "digitalWrite(13, HIGH);"),
                Command::new("delay", "delay(1000);"),
                Command::new("led_off", "digitalWrite(13, LOW);"),
                Command::decoy("analog_read", "analogRead(A0);"),
                Command::decoy("serial_begin", "Serial.begin(9600);"),
            ],
            ChallengeRng::seeded(seed),
        )
    }

    fn step(index: usize, id: &str) -> Step {
        Step {
            index,
            expected_command_id: CommandId::from(id),
        }
    }

    #[test]
    fn generated_sets_are_valid_across_many_seeds() {
        for seed in 0..200 {
            let mut pool = blink_pool(seed);
            let set = pool
                .next_option_set(&step(1, "led_on"), &HashSet::new(), OptionSetSerial(seed))
                .expect("option set");
            assert_eq!(set.options.len(), 3);
            let correct_count = set
                .options
                .iter()
                .filter(|option| option.id == set.correct_command_id)
                .count();
            assert_eq!(correct_count, 1);
            let unique: HashSet<_> = set.option_ids().into_iter().collect();
            assert_eq!(unique.len(), 3);
            assert_eq!(set.for_step_index, 1);
            assert_eq!(set.serial, OptionSetSerial(seed));
        }
    }

    #[test]
    fn correct_position_varies_with_seed() {
        let mut positions = HashSet::new();
        for seed in 0..64 {
            let mut pool = blink_pool(seed);
            let set = pool
                .next_option_set(&step(0, "pin_mode"), &HashSet::new(), OptionSetSerial(0))
                .expect("option set");
            positions.insert(set.correct_position().expect("correct present"));
        }
        assert_eq!(positions.len(), 3);
    }

    #[test]
    fn same_seed_reproduces_identical_sets() {
        let mut a = blink_pool(99);
        let mut b = blink_pool(99);
        for index in 0..10 {
            let s = step(index, "delay");
            let set_a = a
                .next_option_set(&s, &HashSet::new(), OptionSetSerial(0))
                .expect("a");
            let set_b = b
                .next_option_set(&s, &HashSet::new(), OptionSetSerial(0))
                .expect("b");
            assert_eq!(set_a, set_b);
        }
    }

    #[test]
    fn used_commands_are_avoided_while_fresh_decoys_remain() {
        let used: HashSet<CommandId> = ["pin_mode", "led_on", "delay"]
            .into_iter()
            .map(CommandId::from)
            .collect();
        for seed in 0..100 {
            let mut pool = blink_pool(seed);
            let set = pool
                .next_option_set(&step(3, "led_off"), &used, OptionSetSerial(0))
                .expect("option set");
            for option in &set.options {
                assert!(!used.contains(&option.id), "seed {seed} reused {}", option.id);
            }
        }
    }

    #[test]
    fn used_commands_fill_in_when_fresh_decoys_run_out() {
        let used: HashSet<CommandId> = ["pin_mode", "led_on", "delay", "analog_read"]
            .into_iter()
            .map(CommandId::from)
            .collect();
        let mut pool = blink_pool(5);
        let set = pool
            .next_option_set(&step(3, "led_off"), &used, OptionSetSerial(0))
            .expect("option set");
        assert_eq!(set.options.len(), 3);
        assert!(set.contains(&CommandId::from("serial_begin")));
        assert!(set.contains(&CommandId::from("led_off")));
    }

    #[test]
    fn small_pool_reports_insufficient_decoys_and_degrades() {
        let mut pool = OptionPool::new(
            vec![
                Command::new("only", "setup()"),
                Command::decoy("other", "loop()"),
            ],
            ChallengeRng::seeded(1),
        );
        let err = pool
            .next_option_set(&step(0, "only"), &HashSet::new(), OptionSetSerial(0))
            .expect_err("too few decoys");
        assert_eq!(
            err,
            OptionPoolError::InsufficientDecoys {
                step_index: 0,
                required: 2,
                available: 1
            }
        );

        let degraded = pool
            .degraded_option_set(&step(0, "only"), &HashSet::new(), OptionSetSerial(0))
            .expect("degraded set");
        assert!(degraded.is_degraded());
        assert_eq!(degraded.options.len(), 2);
        assert!(degraded.contains(&CommandId::from("only")));
    }

    #[test]
    fn unknown_expected_command_is_an_error() {
        let mut pool = blink_pool(0);
        let err = pool
            .next_option_set(&step(2, "missing"), &HashSet::new(), OptionSetSerial(0))
            .expect_err("unknown");
        assert!(matches!(err, OptionPoolError::UnknownCommand { step_index: 2, .. }));
    }

    #[test]
    fn duplicate_ids_keep_first_definition() {
        let pool = OptionPool::new(
            vec![Command::new("a", "first"), Command::new("a", "second")],
            ChallengeRng::seeded(0),
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(
            pool.command(&CommandId::from("a")).expect("a").display_text,
            "first"
        );
    }
}
