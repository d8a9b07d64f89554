mod core_systems;
mod destruction;
mod loop_runner;
mod metrics;
mod presentation_sync;
mod scene;
mod scheduler;
mod system;
mod transition;

pub use core_systems::install_core_systems;
pub use destruction::{
    handle_animation_finished, install_death_handler, teardown_entity, DeathCountdownSystem,
    DeathSystem, DestructionConfig, DEATH_COUNTDOWN_PRIORITY, DEATH_SYSTEM_PRIORITY,
};
pub use loop_runner::{FrameDriver, FrameOutcome, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use presentation_sync::{
    request_animation, request_effect, request_sound, IntentTranslationSystem,
    PositionSyncSystem, ViewSpawnSystem, INTENT_TRANSLATION_PRIORITY, POSITION_SYNC_PRIORITY,
    VIEW_SPAWN_PRIORITY,
};
pub use scene::{SceneContext, SceneError, SceneKey, SceneModule};
pub use scheduler::{FixedStepReport, FrameStepReport, Scheduler, SchedulerConfig, SchedulerMode};
pub use system::{
    SortedSystemList, System, SystemContext, FIXED_PRIORITY_MAX, RENDER_PRIORITY_MIN,
};
pub use transition::{
    AssetPreloader, ImmediateSceneLoader, PreloadFailure, SceneDirector, SceneHook,
    SceneLoadError, SceneLoader, TransitionError, TransitionOptions, TransitionProgress,
    TransitionReport, TransitionUi,
};
