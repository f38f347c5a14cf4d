use std::io::{self, Write};
use std::sync::Arc;

use super::input::InputSnapshot;
use crate::content::LessonDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneKey {
    A,
    B,
}

impl SceneKey {
    pub fn other(self) -> Self {
        match self {
            SceneKey::A => SceneKey::B,
            SceneKey::B => SceneKey::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    SwitchTo(SceneKey),
    Quit,
}

/// Shared, read-only inputs handed to a scene when it loads.
#[derive(Debug, Clone)]
pub struct SceneResources {
    lessons: Arc<LessonDatabase>,
    base_seed: u64,
}

impl SceneResources {
    pub fn new(lessons: LessonDatabase, base_seed: u64) -> Self {
        Self {
            lessons: Arc::new(lessons),
            base_seed,
        }
    }

    pub fn lessons(&self) -> &LessonDatabase {
        &self.lessons
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }
}

/// A text scene. `update` runs once per fixed tick; `render` writes whatever
/// changed since the previous call.
pub trait Scene {
    fn load(&mut self, resources: &SceneResources);
    fn update(&mut self, fixed_dt_ms: u64, input: &InputSnapshot) -> SceneCommand;
    fn render(&mut self, out: &mut dyn Write) -> io::Result<()>;
    fn unload(&mut self);
    fn debug_title(&self) -> Option<String> {
        None
    }
}

struct SceneRuntime {
    scene: Box<dyn Scene>,
    is_loaded: bool,
}

pub(crate) struct SceneMachine {
    scene_a: SceneRuntime,
    scene_b: SceneRuntime,
    active_scene: SceneKey,
    resources: SceneResources,
}

impl SceneMachine {
    pub(crate) fn new(
        scene_a: Box<dyn Scene>,
        scene_b: Box<dyn Scene>,
        active_scene: SceneKey,
        resources: SceneResources,
    ) -> Self {
        Self {
            scene_a: SceneRuntime {
                scene: scene_a,
                is_loaded: false,
            },
            scene_b: SceneRuntime {
                scene: scene_b,
                is_loaded: false,
            },
            active_scene,
            resources,
        }
    }

    pub(crate) fn active_scene(&self) -> SceneKey {
        self.active_scene
    }

    pub(crate) fn load_active(&mut self) {
        self.load_scene_if_needed(self.active_scene);
    }

    pub(crate) fn update_active(&mut self, fixed_dt_ms: u64, input: &InputSnapshot) -> SceneCommand {
        self.active_runtime_mut().scene.update(fixed_dt_ms, input)
    }

    pub(crate) fn render_active(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.active_runtime_mut().scene.render(out)
    }

    pub(crate) fn debug_title_active(&self) -> Option<String> {
        self.active_runtime_ref().scene.debug_title()
    }

    pub(crate) fn switch_to(&mut self, next_scene: SceneKey) -> bool {
        if self.active_scene == next_scene {
            return false;
        }

        self.load_scene_if_needed(next_scene);
        self.active_scene = next_scene;
        true
    }

    pub(crate) fn shutdown_all(&mut self) {
        for runtime in [&mut self.scene_a, &mut self.scene_b] {
            if runtime.is_loaded {
                runtime.scene.unload();
                runtime.is_loaded = false;
            }
        }
    }

    fn load_scene_if_needed(&mut self, key: SceneKey) {
        if self.runtime_ref(key).is_loaded {
            return;
        }
        let resources = self.resources.clone();
        let runtime = self.runtime_mut(key);
        runtime.scene.load(&resources);
        runtime.is_loaded = true;
    }

    fn active_runtime_mut(&mut self) -> &mut SceneRuntime {
        self.runtime_mut(self.active_scene)
    }

    fn active_runtime_ref(&self) -> &SceneRuntime {
        self.runtime_ref(self.active_scene)
    }

    fn runtime_mut(&mut self, key: SceneKey) -> &mut SceneRuntime {
        match key {
            SceneKey::A => &mut self.scene_a,
            SceneKey::B => &mut self.scene_b,
        }
    }

    fn runtime_ref(&self, key: SceneKey) -> &SceneRuntime {
        match key {
            SceneKey::A => &self.scene_a,
            SceneKey::B => &self.scene_b,
        }
    }
}
