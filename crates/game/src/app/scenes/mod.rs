use challenge_engine::{Scene, SceneKey};

mod circuit_repair;
mod presenter;
mod program_builder;

use circuit_repair::CircuitRepairScene;
use program_builder::ProgramBuilderScene;

/// A status line is printed every this many ticks while a challenge runs.
const STATUS_EVERY_TICKS: u32 = 5;

/// Scene A is the program builder, scene B the circuit repair.
pub(crate) fn build_scene_pair(
    lesson: &str,
    repair_scene: &str,
) -> (Box<dyn Scene>, Box<dyn Scene>) {
    let scene_a = ProgramBuilderScene::new(lesson, SceneKey::B);
    let scene_b = CircuitRepairScene::new(repair_scene, SceneKey::A);
    (Box::new(scene_a), Box::new(scene_b))
}

#[cfg(test)]
mod tests;
