use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use sim_core::app::{teardown_entity, TransitionProgress};
use sim_core::ecs::{Handle, SceneScope};
use sim_core::persistence::ConfigError;
use sim_core::{
    install_core_systems, resolve_app_paths, AppPaths, ConfigLookup, Event, FileSaveStore,
    FrameDriver, SaveInfo, SaveManager, SceneDirector, SceneKey, Scheduler, SnapshotError,
    TransitionError, TransitionOptions, World,
};
use thiserror::Error;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::gameplay::{
    build_scene_director, install_gameplay_systems, load_config_database, spawn_player,
    LoggingPresentation, PresentationStats, ARENA_SCENE, VILLAGE_SCENE, WAVE_CLEARED_TOPIC,
};

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Save(#[from] SnapshotError),
}

/// How frame time advances. Tests use simulated instants so tick counts do
/// not depend on the machine.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Pacing {
    WallClock { run_for: Duration },
    Simulated { frames: u32, frame_dt: Duration },
}

#[derive(Debug)]
pub(crate) struct SessionSummary {
    pub(crate) frames: u32,
    pub(crate) ticks: u64,
    pub(crate) scene: Option<SceneKey>,
    pub(crate) waves_cleared: u32,
    pub(crate) saved: SaveInfo,
    pub(crate) restored_entities: usize,
    pub(crate) restored_player: Option<Handle>,
    pub(crate) presentation: PresentationStats,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let paths = match resolve_app_paths() {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let pacing = Pacing::WallClock {
        run_for: app.run_for,
    };
    match run_session(&app, &paths, pacing) {
        Ok(summary) => {
            info!(
                frames = summary.frames,
                ticks = summary.ticks,
                scene = ?summary.scene.as_ref().map(SceneKey::as_str),
                waves_cleared = summary.waves_cleared,
                saved_slot = summary.saved.slot,
                restored_entities = summary.restored_entities,
                restored_player = ?summary.restored_player,
                "session_finished"
            );
            let presentation = &summary.presentation;
            info!(
                commands_applied = presentation.commands_applied,
                views_spawned = presentation.views_spawned,
                views_destroyed = presentation.views_destroyed,
                live_views = presentation.live_views,
                animations_finished = presentation.animations_finished,
                bgm = ?presentation.current_bgm,
                "presentation_summary"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "session_failed");
            ExitCode::FAILURE
        }
    }
}

/// Plays the arena until `pacing` runs out, then saves the player and
/// reloads the slot into a fresh world.
pub(crate) fn run_session(
    app: &AppWiring,
    paths: &AppPaths,
    pacing: Pacing,
) -> Result<SessionSummary, SessionError> {
    let defs = Arc::new(load_config_database(&paths.config_dir)?);

    let mut scheduler = Scheduler::with_queues(app.scheduler.clone());
    install_core_systems(&mut scheduler, app.destruction.clone());
    install_gameplay_systems(&mut scheduler);
    let (presentation, stats) = LoggingPresentation::new();
    scheduler.attach_presentation(Box::new(presentation));

    let mut world = World::new();
    spawn_player(&mut world, &defs);

    let mut director = build_scene_director();
    director.switch_scene(SceneKey::from(ARENA_SCENE), TransitionOptions::default())?;

    let mut driver = FrameDriver::new(&app.frame_loop);
    let started = Instant::now();
    let mut frames = 0_u32;
    let mut waves_cleared = 0_u32;
    loop {
        let outcome = match pacing {
            Pacing::WallClock { run_for } => {
                if started.elapsed() >= run_for {
                    break;
                }
                driver.run_frame(&mut scheduler, Some(&mut director), &mut world)
            }
            Pacing::Simulated {
                frames: limit,
                frame_dt,
            } => {
                if frames >= limit {
                    break;
                }
                let now = started + frame_dt * frames;
                driver.frame(now, &mut scheduler, Some(&mut director), &mut world)
            }
        };
        frames += 1;

        if let TransitionProgress::Finished(Err(err)) = outcome.transition {
            return Err(err.into());
        }
        if arena_cleared(&director, &world) {
            waves_cleared += 1;
            if let Some(events) = scheduler.events_mut() {
                events.push(Event::Ui {
                    name: WAVE_CLEARED_TOPIC.to_string(),
                    payload: json!({ "scene": ARENA_SCENE, "frame": frames }),
                });
            }
            director.switch_scene(SceneKey::from(VILLAGE_SCENE), TransitionOptions::default())?;
        }
    }

    let lookup: Arc<dyn ConfigLookup> = defs;
    let mut saves = SaveManager::new(Box::new(FileSaveStore::new(&paths.saves_dir)))
        .with_config_lookup(lookup);
    let saved = saves.save(app.save_slot, &world)?;
    info!(slot = saved.slot, entities = saved.entity_count, "session_saved");

    let loaded = saves.load(app.save_slot, &world)?;
    retire_world(&mut scheduler, &mut world);
    world = loaded.world;
    // Restored entities carry NeedsView; one frame step respawns their views.
    scheduler.step_frame(&mut world, Duration::ZERO);

    let presentation = stats.borrow().clone();
    Ok(SessionSummary {
        frames,
        ticks: scheduler.total_ticks(),
        scene: director.current_scene().cloned(),
        waves_cleared,
        saved,
        restored_entities: loaded.entities.len(),
        restored_player: loaded.player,
        presentation,
    })
}

fn arena_cleared(director: &SceneDirector, world: &World) -> bool {
    !director.is_transitioning()
        && director
            .current_scene()
            .is_some_and(|scene| scene.as_str() == ARENA_SCENE)
        && world.query::<SceneScope>().is_empty()
}

/// Tears down every view of a world that is about to be replaced; the
/// loaded world respawns its own.
fn retire_world(scheduler: &mut Scheduler, world: &mut World) {
    let Some(commands) = scheduler.commands_mut() else {
        return;
    };
    let mut retired = 0_usize;
    for handle in world.entities() {
        if teardown_entity(world, commands, handle) {
            retired += 1;
        }
    }
    scheduler.step_frame(world, Duration::ZERO);
    info!(retired, "world_retired");
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn temp_paths(temp: &TempDir) -> AppPaths {
        AppPaths {
            root: temp.path().to_path_buf(),
            config_dir: temp.path().join("config"),
            saves_dir: temp.path().join("saves"),
        }
    }

    #[test]
    fn simulated_session_clears_the_arena_then_saves_and_restores_the_player() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        let pacing = Pacing::Simulated {
            frames: 240,
            frame_dt: Duration::from_nanos(16_666_667),
        };

        let summary = run_session(&AppWiring::default(), &paths, pacing).expect("session");

        assert_eq!(summary.frames, 240);
        assert!(summary.ticks >= 230);
        assert_eq!(summary.waves_cleared, 1);
        assert_eq!(
            summary.scene.as_ref().map(SceneKey::as_str),
            Some(VILLAGE_SCENE)
        );
        assert_eq!(summary.saved.entity_count, 1);
        assert_eq!(summary.saved.player_name.as_deref(), Some("Player"));
        assert_eq!(summary.restored_entities, 1);
        assert!(summary.restored_player.is_some());
        assert_eq!(summary.presentation.live_views, 1);
        assert_eq!(
            summary.presentation.current_bgm.as_deref(),
            Some("bgm/village")
        );
        assert!(paths.saves_dir.join("save_0.json").is_file());
    }

    #[test]
    fn session_too_short_to_clear_the_arena_stays_there() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        let pacing = Pacing::Simulated {
            frames: 30,
            frame_dt: Duration::from_nanos(16_666_667),
        };

        let summary = run_session(&AppWiring::default(), &paths, pacing).expect("session");

        assert_eq!(summary.waves_cleared, 0);
        assert_eq!(
            summary.scene.as_ref().map(SceneKey::as_str),
            Some(ARENA_SCENE)
        );
        assert_eq!(summary.restored_entities, 1);
    }

    #[test]
    fn malformed_defs_file_fails_the_session() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        std::fs::create_dir_all(&paths.config_dir).expect("mkdir");
        std::fs::write(paths.config_dir.join("defs.json"), "{ not json").expect("write");

        let result = run_session(
            &AppWiring::default(),
            &paths,
            Pacing::Simulated {
                frames: 1,
                frame_dt: Duration::from_millis(16),
            },
        );

        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}
