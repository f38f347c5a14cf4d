use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::content::{compile_lesson_database, ContentCompileError};
use crate::{resolve_app_paths, StartupError};

use super::scene::{SceneMachine, SceneResources};
use super::{InputSnapshot, Scene, SceneCommand, SceneKey};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub tick_interval: Duration,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub initial_scene: SceneKey,
    pub base_seed: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_frame_delta: Duration::from_secs(5),
            max_ticks_per_frame: 5,
            initial_scene: SceneKey::A,
            base_seed: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to compile lesson content: {0}")]
    Content(#[from] ContentCompileError),
    #[error("failed to spawn stdin reader thread: {0}")]
    SpawnReader(#[source] io::Error),
    #[error("failed to write to the presenter output: {0}")]
    Output(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    QuitRequested,
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    pub reason: ExitReason,
    pub ticks: u64,
}

pub fn run_app(
    config: LoopConfig,
    scene_a: Box<dyn Scene>,
    scene_b: Box<dyn Scene>,
) -> Result<LoopExit, AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        lessons_dir = %app_paths.lessons_dir.display(),
        "startup"
    );
    let lessons = compile_lesson_database(&app_paths.lessons_dir)?;
    let resources = SceneResources::new(lessons, config.base_seed);
    let lines = spawn_stdin_reader()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_loop(&config, resources, scene_a, scene_b, &lines, &mut out)
}

/// Drives the scenes until a scene asks to quit or the input channel closes.
/// Lines are applied as soon as they arrive through a zero-length update so
/// the player never waits for the next tick to see a response.
pub fn run_loop<W: Write>(
    config: &LoopConfig,
    resources: SceneResources,
    scene_a: Box<dyn Scene>,
    scene_b: Box<dyn Scene>,
    lines: &Receiver<String>,
    out: &mut W,
) -> Result<LoopExit, AppError> {
    let fixed_dt = normalize_non_zero_duration(config.tick_interval, DEFAULT_TICK_INTERVAL);
    let fixed_dt_ms = u64::try_from(fixed_dt.as_millis()).unwrap_or(u64::MAX).max(1);
    let max_frame_delta = normalize_non_zero_duration(config.max_frame_delta, fixed_dt);
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);

    let mut scenes = SceneMachine::new(scene_a, scene_b, config.initial_scene, resources);
    scenes.load_active();
    info!(
        scene = ?scenes.active_scene(),
        title = scenes.debug_title_active().unwrap_or_default(),
        "scene_loaded"
    );
    info!(
        tick_ms = fixed_dt_ms,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        "loop_config"
    );
    present(&mut scenes, out)?;

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut ticks = 0u64;

    let reason = 'frames: loop {
        let (pending, input_closed) = collect_lines(lines, fixed_dt.saturating_sub(accumulator));

        if !pending.is_empty() {
            let input = InputSnapshot::from_lines(&pending);
            let command = scenes.update_active(0, &input);
            if apply_scene_command(&mut scenes, command) {
                present(&mut scenes, out)?;
                break 'frames ExitReason::QuitRequested;
            }
            present(&mut scenes, out)?;
        }
        if input_closed {
            break 'frames ExitReason::InputClosed;
        }

        let now = Instant::now();
        let frame_dt = clamp_frame_delta(
            now.saturating_duration_since(last_frame_instant),
            max_frame_delta,
        );
        last_frame_instant = now;
        accumulator = accumulator.saturating_add(frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let command = scenes.update_active(fixed_dt_ms, &InputSnapshot::empty());
            ticks = ticks.saturating_add(1);
            debug!(tick = ticks, scene = ?scenes.active_scene(), "tick");
            if apply_scene_command(&mut scenes, command) {
                present(&mut scenes, out)?;
                break 'frames ExitReason::QuitRequested;
            }
        }
        accumulator = step_plan.remaining_accumulator;
        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }
        if step_plan.ticks_to_run > 0 {
            present(&mut scenes, out)?;
        }
    };

    scenes.shutdown_all();
    info!(reason = ?reason, ticks, "shutdown");
    Ok(LoopExit { reason, ticks })
}

/// Returns `true` when the loop should stop.
fn apply_scene_command(scenes: &mut SceneMachine, command: SceneCommand) -> bool {
    let switched = match command {
        SceneCommand::None => false,
        SceneCommand::SwitchTo(next_scene) => scenes.switch_to(next_scene),
        SceneCommand::Quit => {
            info!(reason = "scene_quit", "shutdown_requested");
            return true;
        }
    };
    if switched {
        info!(
            scene = ?scenes.active_scene(),
            title = scenes.debug_title_active().unwrap_or_default(),
            "scene_switched"
        );
    }
    false
}

fn present<W: Write>(scenes: &mut SceneMachine, out: &mut W) -> Result<(), AppError> {
    scenes.render_active(out).map_err(AppError::Output)?;
    out.flush().map_err(AppError::Output)
}

/// Waits up to `timeout` for the first line, then takes whatever else is
/// already queued.
fn collect_lines(lines: &Receiver<String>, timeout: Duration) -> (Vec<String>, bool) {
    let mut pending = Vec::new();
    match lines.recv_timeout(timeout) {
        Ok(line) => pending.push(line),
        Err(RecvTimeoutError::Timeout) => return (pending, false),
        Err(RecvTimeoutError::Disconnected) => return (pending, true),
    }
    loop {
        match lines.try_recv() {
            Ok(line) => pending.push(line),
            Err(TryRecvError::Empty) => return (pending, false),
            Err(TryRecvError::Disconnected) => return (pending, true),
        }
    }
}

pub fn spawn_stdin_reader() -> Result<Receiver<String>, AppError> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("stdin_reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "stdin_read_failed");
                        break;
                    }
                }
            }
        })
        .map_err(AppError::SpawnReader)?;
    Ok(receiver)
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
