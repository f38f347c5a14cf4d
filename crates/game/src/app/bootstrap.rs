use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use challenge_engine::{resolve_app_paths, LoopConfig, Scene, SceneKey, StartupError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::scenes;

pub(crate) const SETTINGS_FILE: &str = "lab.settings.json";
pub(crate) const SEED_ENV_VAR: &str = "ARDULAB_SEED";
pub(crate) const TICK_MS_ENV_VAR: &str = "ARDULAB_TICK_MS";
pub(crate) const SCENE_ENV_VAR: &str = "ARDULAB_SCENE";

const DEFAULT_SEED: u64 = 0x00A2_D1B0;
const DEFAULT_TICK_MS: u64 = 1000;
const DEFAULT_LESSON: &str = "lesson.blink";
const DEFAULT_REPAIR_SCENE: &str = "scene.circuit_repair";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SceneChoice {
    #[default]
    ProgramBuilder,
    CircuitRepair,
}

impl SceneChoice {
    fn scene_key(self) -> SceneKey {
        match self {
            SceneChoice::ProgramBuilder => SceneKey::A,
            SceneChoice::CircuitRepair => SceneKey::B,
        }
    }
}

impl FromStr for SceneChoice {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "program_builder" | "program" => Ok(SceneChoice::ProgramBuilder),
            "circuit_repair" | "repair" => Ok(SceneChoice::CircuitRepair),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LabSettings {
    pub(crate) seed: u64,
    pub(crate) tick_ms: u64,
    pub(crate) scene: SceneChoice,
    pub(crate) lesson: String,
    pub(crate) repair_scene: String,
}

impl Default for LabSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            tick_ms: DEFAULT_TICK_MS,
            scene: SceneChoice::default(),
            lesson: DEFAULT_LESSON.to_string(),
            repair_scene: DEFAULT_REPAIR_SCENE.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to read settings file {path}: {source}")]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings file {path}: {message}")]
    ParseSettings { path: PathBuf, message: String },
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene_a: Box<dyn Scene>,
    pub(crate) scene_b: Box<dyn Scene>,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Arduino Lab Startup ===");

    let app_paths = resolve_app_paths()?;
    let mut settings = load_settings(&app_paths.root.join(SETTINGS_FILE))?;
    apply_env_overrides(&mut settings, |var| env::var(var));
    info!(
        seed = settings.seed,
        tick_ms = settings.tick_ms,
        scene = ?settings.scene,
        lesson = %settings.lesson,
        repair_scene = %settings.repair_scene,
        "settings_resolved"
    );

    let (scene_a, scene_b) = scenes::build_scene_pair(&settings.lesson, &settings.repair_scene);
    let config = LoopConfig {
        tick_interval: Duration::from_millis(settings.tick_ms),
        initial_scene: settings.scene.scene_key(),
        base_seed: settings.seed,
        ..LoopConfig::default()
    };

    Ok(AppWiring {
        config,
        scene_a,
        scene_b,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// A missing file means defaults.
pub(crate) fn load_settings(path: &Path) -> Result<LabSettings, BootstrapError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(LabSettings::default());
        }
        Err(source) => {
            return Err(BootstrapError::ReadSettings {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_settings_json(&raw).map_err(|message| BootstrapError::ParseSettings {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_settings_json(raw: &str) -> Result<LabSettings, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, LabSettings>(&mut deserializer) {
        Ok(settings) => Ok(settings),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse settings json: {source}"))
            } else {
                Err(format!("parse settings json at {path}: {source}"))
            }
        }
    }
}

pub(crate) fn apply_env_overrides<F>(settings: &mut LabSettings, read_var: F)
where
    F: Fn(&'static str) -> Result<String, env::VarError>,
{
    if let Some(seed) = parse_env_value::<u64, _>(&read_var, SEED_ENV_VAR) {
        settings.seed = seed;
    }
    if let Some(tick_ms) = parse_env_value::<u64, _>(&read_var, TICK_MS_ENV_VAR) {
        if tick_ms == 0 {
            warn!(
                env_var = TICK_MS_ENV_VAR,
                "tick interval must be positive; keeping configured value"
            );
        } else {
            settings.tick_ms = tick_ms;
        }
    }
    if let Some(scene) = parse_env_value::<SceneChoice, _>(&read_var, SCENE_ENV_VAR) {
        settings.scene = scene;
    }
}

fn parse_env_value<T, F>(read_var: &F, env_var: &'static str) -> Option<T>
where
    T: FromStr,
    F: Fn(&'static str) -> Result<String, env::VarError>,
{
    match read_var(env_var) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(
                    env_var,
                    value = value.as_str(),
                    "invalid env var value; falling back to settings"
                );
                None
            }
        },
        Err(env::VarError::NotPresent) => None,
        Err(error) => {
            warn!(
                env_var,
                error = %error,
                "unable to read env var; falling back to settings"
            );
            None
        }
    }
}
