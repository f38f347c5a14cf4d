mod input;
mod loop_runner;
mod scene;

pub use input::{InputAction, InputSnapshot};
pub use loop_runner::{
    run_app, run_loop, spawn_stdin_reader, AppError, ExitReason, LoopConfig, LoopExit,
    DEFAULT_TICK_INTERVAL,
};
pub use scene::{Scene, SceneCommand, SceneKey, SceneResources};
