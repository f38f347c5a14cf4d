use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod challenge;
pub mod content;

pub use app::{
    run_app, run_loop, spawn_stdin_reader, AppError, ExitReason, InputAction, InputSnapshot,
    LoopConfig, LoopExit, Scene, SceneCommand, SceneKey, SceneResources, DEFAULT_TICK_INTERVAL,
};
pub use challenge::{
    AggregatorError, AggregatorHandle, AttackSchedule, ChallengeConfig, ChallengeController,
    ChallengeEvent, ChallengeHost, ChallengeState, Command, CommandId, ConfigError, HostError,
    HostEvent, HostEventSource, IgnoredSubmit, IntegrityTier, OptionSet, OptionSetSerial,
    SessionHandle, SessionSnapshot, Step, SubmitOutcome, SubmitResult, SubsystemAggregator,
    SubsystemId,
};
pub use content::{
    compile_lesson_database, compile_lesson_source, ChallengeDef, ContentCompileError,
    ContentErrorCode, LessonDatabase, RepairSceneDef, RepairSlotDef, SourceLocation,
};

pub const ROOT_ENV_VAR: &str = "ARDULAB_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub lessons_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "ARDULAB_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or lessons/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or lessons/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/arduino-lab\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
    #[error("lessons directory is missing: {0}")]
    MissingLessonsDir(PathBuf),
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_for_root(root)
}

pub fn app_paths_for_root(root: PathBuf) -> Result<AppPaths, StartupError> {
    let lessons_dir = root.join("lessons");
    if !lessons_dir.is_dir() {
        return Err(StartupError::MissingLessonsDir(lessons_dir));
    }
    Ok(AppPaths { root, lessons_dir })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            find_root_from(&exe_dir).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_from(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .find(|candidate| is_repo_marker(candidate))
        .map(normalize_path)
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_lessons = path.join("lessons").is_dir();

    cargo_toml && (has_crates || has_lessons)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("lessons")).expect("mkdir");
        assert!(!is_repo_marker(temp.path()));

        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn root_is_found_from_a_nested_directory() {
        let temp = TempDir::new().expect("temp");
        let root = temp.path();
        fs::write(root.join("Cargo.toml"), "[workspace]\n").expect("write");
        fs::create_dir_all(root.join("lessons")).expect("mkdir");
        let nested = root.join("target").join("debug");
        fs::create_dir_all(&nested).expect("mkdir nested");

        let found = find_root_from(&nested).expect("root");
        assert_eq!(found, normalize_path(root));

        let paths = app_paths_for_root(found).expect("paths");
        assert!(paths.lessons_dir.ends_with("lessons"));
    }

    #[test]
    fn missing_lessons_dir_is_a_startup_error() {
        let temp = TempDir::new().expect("temp");
        let err = app_paths_for_root(temp.path().to_path_buf()).expect_err("missing");
        assert!(matches!(err, StartupError::MissingLessonsDir(_)));
    }
}
