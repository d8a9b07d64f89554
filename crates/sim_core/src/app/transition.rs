use std::collections::HashMap;
use std::task::Poll;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ecs::{SceneScope, World};

use super::destruction::teardown_entity;
use super::scene::{SceneContext, SceneError, SceneKey, SceneModule};
use super::scheduler::Scheduler;

/// Engine-side scene loading. `begin_load` starts the work; `poll_load` is
/// asked once per frame until it is ready.
pub trait SceneLoader {
    fn begin_load(&mut self, scene: &SceneKey) -> Result<(), SceneLoadError>;

    fn poll_load(&mut self, scene: &SceneKey) -> Poll<Result<(), SceneLoadError>>;
}

/// Loader for setups where scene content needs no engine work.
#[derive(Debug, Default)]
pub struct ImmediateSceneLoader;

impl SceneLoader for ImmediateSceneLoader {
    fn begin_load(&mut self, _scene: &SceneKey) -> Result<(), SceneLoadError> {
        Ok(())
    }

    fn poll_load(&mut self, _scene: &SceneKey) -> Poll<Result<(), SceneLoadError>> {
        Poll::Ready(Ok(()))
    }
}

pub trait AssetPreloader {
    fn preload(&mut self, asset_key: &str) -> Result<(), String>;
}

pub trait TransitionUi {
    fn transition_started(&mut self, from: Option<&SceneKey>, to: &SceneKey);

    fn transition_finished(&mut self, outcome: &Result<TransitionReport, TransitionError>);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scene loader failed for '{scene}': {reason}")]
pub struct SceneLoadError {
    pub scene: SceneKey,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneHook {
    Preload,
    Exit,
    Enter,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("a transition to '{0}' is already in flight")]
    AlreadyTransitioning(SceneKey),
    #[error("no scene module registered for '{0}'")]
    UnknownScene(SceneKey),
    #[error("scheduler has no command buffer attached")]
    MissingCommandBuffer,
    #[error("scene '{scene}' {hook:?} hook failed")]
    Hook {
        scene: SceneKey,
        hook: SceneHook,
        #[source]
        source: SceneError,
    },
    #[error(transparent)]
    Load(#[from] SceneLoadError),
}

/// Each step of a transition can be skipped independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOptions {
    pub pause_and_notify: bool,
    pub preload: bool,
    pub cleanup: bool,
    pub exit_hook: bool,
    pub load_scene: bool,
    pub enter_hook: bool,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            pause_and_notify: true,
            preload: true,
            cleanup: true,
            exit_hook: true,
            load_scene: true,
            enter_hook: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadFailure {
    pub asset_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub from: Option<SceneKey>,
    pub to: SceneKey,
    pub entities_cleaned: usize,
    /// Assets that failed to preload. These never abort the transition.
    pub preload_failures: Vec<PreloadFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionProgress {
    Idle,
    InFlight,
    Finished(Result<TransitionReport, TransitionError>),
}

enum Stage {
    Requested,
    AwaitingLoader,
}

struct PendingTransition {
    options: TransitionOptions,
    stage: Stage,
    report: TransitionReport,
}

/// Owns the scene modules and walks a scene change through its ordered
/// steps: pause, preload, cleanup, exit, load, enter, resume.
pub struct SceneDirector {
    modules: HashMap<SceneKey, Box<dyn SceneModule>>,
    current: Option<SceneKey>,
    pending: Option<PendingTransition>,
    loader: Box<dyn SceneLoader>,
    preloader: Option<Box<dyn AssetPreloader>>,
    ui: Option<Box<dyn TransitionUi>>,
}

impl SceneDirector {
    pub fn new(loader: Box<dyn SceneLoader>) -> Self {
        Self {
            modules: HashMap::new(),
            current: None,
            pending: None,
            loader,
            preloader: None,
            ui: None,
        }
    }

    pub fn with_preloader(mut self, preloader: Box<dyn AssetPreloader>) -> Self {
        self.preloader = Some(preloader);
        self
    }

    pub fn with_ui(mut self, ui: Box<dyn TransitionUi>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn register(&mut self, key: SceneKey, module: Box<dyn SceneModule>) {
        if self.modules.insert(key.clone(), module).is_some() {
            warn!(scene = %key, "scene_module_replaced");
        }
    }

    pub fn current_scene(&self) -> Option<&SceneKey> {
        self.current.as_ref()
    }

    pub fn is_transitioning(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_target(&self) -> Option<&SceneKey> {
        self.pending.as_ref().map(|pending| &pending.report.to)
    }

    /// Records a scene change. Requests made while one is in flight are
    /// rejected, not queued.
    pub fn switch_scene(
        &mut self,
        target: SceneKey,
        options: TransitionOptions,
    ) -> Result<(), TransitionError> {
        if let Some(pending) = &self.pending {
            warn!(
                requested = %target,
                in_flight = %pending.report.to,
                "scene_switch_rejected"
            );
            return Err(TransitionError::AlreadyTransitioning(
                pending.report.to.clone(),
            ));
        }
        if !self.modules.contains_key(&target) {
            return Err(TransitionError::UnknownScene(target));
        }
        info!(from = ?self.current.as_ref().map(SceneKey::as_str), to = %target, "scene_switch_requested");
        self.pending = Some(PendingTransition {
            options,
            stage: Stage::Requested,
            report: TransitionReport {
                from: self.current.clone(),
                to: target,
                entities_cleaned: 0,
                preload_failures: Vec::new(),
            },
        });
        Ok(())
    }

    /// Advances the in-flight transition as far as it can go this frame.
    /// Only the scene loader can hold it across frames.
    pub fn poll(&mut self, scheduler: &mut Scheduler, world: &mut World) -> TransitionProgress {
        let Some(mut pending) = self.pending.take() else {
            return TransitionProgress::Idle;
        };

        let step = match pending.stage {
            Stage::Requested => self.run_leading_steps(&mut pending, scheduler, world),
            Stage::AwaitingLoader => self.poll_loader(&pending),
        };

        match step {
            Ok(StepOutcome::Waiting) => {
                pending.stage = Stage::AwaitingLoader;
                self.pending = Some(pending);
                TransitionProgress::InFlight
            }
            Ok(StepOutcome::Loaded) => {
                let outcome = self
                    .run_enter(&pending, scheduler, world)
                    .map(|()| pending.report);
                TransitionProgress::Finished(self.finish(scheduler, outcome))
            }
            Err(error) => TransitionProgress::Finished(self.finish(scheduler, Err(error))),
        }
    }

    fn run_leading_steps(
        &mut self,
        pending: &mut PendingTransition,
        scheduler: &mut Scheduler,
        world: &mut World,
    ) -> Result<StepOutcome, TransitionError> {
        let options = pending.options;
        let target = pending.report.to.clone();

        if options.pause_and_notify {
            scheduler.enter_transition();
            if let Some(ui) = self.ui.as_mut() {
                ui.transition_started(pending.report.from.as_ref(), &target);
            }
        }

        let commands = scheduler
            .commands_mut()
            .ok_or(TransitionError::MissingCommandBuffer)?;

        if options.preload {
            let module = self
                .modules
                .get_mut(&target)
                .ok_or_else(|| TransitionError::UnknownScene(target.clone()))?;
            if let Some(preloader) = self.preloader.as_mut() {
                for asset_key in module.preload_assets() {
                    if let Err(reason) = preloader.preload(&asset_key) {
                        warn!(asset_key = %asset_key, reason = %reason, "asset_preload_failed");
                        pending
                            .report
                            .preload_failures
                            .push(PreloadFailure { asset_key, reason });
                    }
                }
            }
            let mut context = SceneContext::new(world, commands, &target);
            module
                .preload(&mut context)
                .map_err(|source| TransitionError::Hook {
                    scene: target.clone(),
                    hook: SceneHook::Preload,
                    source,
                })?;
        }

        if let Some(outgoing) = pending.report.from.clone() {
            if options.cleanup {
                let scoped: Vec<_> = world
                    .query::<SceneScope>()
                    .into_iter()
                    .filter(|handle| {
                        world.get::<SceneScope>(*handle).map(|scope| &scope.0) == Some(&outgoing)
                    })
                    .collect();
                for handle in scoped {
                    if teardown_entity(world, commands, handle) {
                        pending.report.entities_cleaned += 1;
                    }
                }
                debug!(
                    scene = %outgoing,
                    entities = pending.report.entities_cleaned,
                    "scene_entities_cleaned"
                );
            }

            if options.exit_hook {
                if let Some(module) = self.modules.get_mut(&outgoing) {
                    let mut context = SceneContext::new(world, commands, &outgoing);
                    module
                        .exit(&mut context)
                        .map_err(|source| TransitionError::Hook {
                            scene: outgoing.clone(),
                            hook: SceneHook::Exit,
                            source,
                        })?;
                }
            }
        }

        if !options.load_scene {
            return Ok(StepOutcome::Loaded);
        }
        self.loader.begin_load(&target)?;
        self.poll_loader(pending)
    }

    fn poll_loader(&mut self, pending: &PendingTransition) -> Result<StepOutcome, TransitionError> {
        match self.loader.poll_load(&pending.report.to) {
            Poll::Pending => Ok(StepOutcome::Waiting),
            Poll::Ready(Ok(())) => Ok(StepOutcome::Loaded),
            Poll::Ready(Err(error)) => Err(error.into()),
        }
    }

    fn run_enter(
        &mut self,
        pending: &PendingTransition,
        scheduler: &mut Scheduler,
        world: &mut World,
    ) -> Result<(), TransitionError> {
        if !pending.options.enter_hook {
            return Ok(());
        }
        let target = &pending.report.to;
        let commands = scheduler
            .commands_mut()
            .ok_or(TransitionError::MissingCommandBuffer)?;
        let module = self
            .modules
            .get_mut(target)
            .ok_or_else(|| TransitionError::UnknownScene(target.clone()))?;
        let mut context = SceneContext::new(world, commands, target);
        module
            .enter(&mut context)
            .map_err(|source| TransitionError::Hook {
                scene: target.clone(),
                hook: SceneHook::Enter,
                source,
            })
    }

    /// Runs on success and failure alike: the scheduler always resumes and
    /// the UI always hears the outcome.
    fn finish(
        &mut self,
        scheduler: &mut Scheduler,
        outcome: Result<TransitionReport, TransitionError>,
    ) -> Result<TransitionReport, TransitionError> {
        match &outcome {
            Ok(report) => {
                self.current = Some(report.to.clone());
                info!(
                    scene = %report.to,
                    entities_cleaned = report.entities_cleaned,
                    preload_failures = report.preload_failures.len(),
                    "scene_transition_finished"
                );
            }
            Err(error) => warn!(error = %error, "scene_transition_failed"),
        }
        scheduler.resume();
        if let Some(ui) = self.ui.as_mut() {
            ui.transition_finished(&outcome);
        }
        outcome
    }
}

enum StepOutcome {
    Waiting,
    Loaded,
}
