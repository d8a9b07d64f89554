use sim_core::app::{ImmediateSceneLoader, SceneContext, SceneError, SceneKey, SceneModule};
use sim_core::ecs::{Health, Position, Vec2};
use sim_core::{Command, SceneDirector};
use tracing::info;

use super::presentation::{LoggingTransitionUi, ManifestPreloader};
use super::systems::{Attrition, Drift};

pub(crate) const ARENA_SCENE: &str = "arena";
pub(crate) const VILLAGE_SCENE: &str = "village";

const SLIME_COUNT: usize = 3;
const SLIME_HEALTH: i32 = 3;
const SLIME_ATTRITION_SECONDS: f32 = 0.5;

#[derive(Debug, Default)]
pub(crate) struct ArenaScene;

impl SceneModule for ArenaScene {
    fn preload_assets(&self) -> Vec<String> {
        vec![
            "sprite/slime".to_string(),
            "sfx/hit".to_string(),
            "fx/spark".to_string(),
            "bgm/arena".to_string(),
            // Not in the manifest; reported without aborting the transition.
            "fx/shockwave".to_string(),
        ]
    }

    fn enter(&mut self, context: &mut SceneContext<'_>) -> Result<(), SceneError> {
        for index in 0..SLIME_COUNT {
            let position = Position {
                x: 4.0 + index as f32 * 2.0,
                y: 1.0,
            };
            let slime = context.spawn_scoped_sprite("sprite/slime", position);
            let _ = context.world.insert(slime, Health::new(SLIME_HEALTH));
            let _ = context.world.insert(
                slime,
                Drift {
                    velocity: Vec2 { x: -0.5, y: 0.0 },
                },
            );
            let _ = context
                .world
                .insert(slime, Attrition::every(SLIME_ATTRITION_SECONDS));
        }
        context.commands.push(Command::PlayBgm {
            track: "bgm/arena".to_string(),
        });
        info!(scene = %context.scene(), slimes = SLIME_COUNT, "arena_entered");
        Ok(())
    }

    fn exit(&mut self, context: &mut SceneContext<'_>) -> Result<(), SceneError> {
        info!(scene = %context.scene(), "arena_exited");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct VillageScene;

impl SceneModule for VillageScene {
    fn preload_assets(&self) -> Vec<String> {
        vec!["sprite/villager".to_string(), "bgm/village".to_string()]
    }

    fn enter(&mut self, context: &mut SceneContext<'_>) -> Result<(), SceneError> {
        for (x, speed) in [(-3.0_f32, 0.25_f32), (3.0, -0.25)] {
            let villager = context.spawn_scoped_sprite("sprite/villager", Position { x, y: 0.0 });
            let _ = context.world.insert(
                villager,
                Drift {
                    velocity: Vec2 { x: speed, y: 0.0 },
                },
            );
        }
        context.commands.push(Command::PlayBgm {
            track: "bgm/village".to_string(),
        });
        info!(scene = %context.scene(), "village_entered");
        Ok(())
    }
}

pub(crate) fn build_scene_director() -> SceneDirector {
    let mut director = SceneDirector::new(Box::new(ImmediateSceneLoader))
        .with_preloader(Box::new(ManifestPreloader::default()))
        .with_ui(Box::new(LoggingTransitionUi));
    director.register(SceneKey::from(ARENA_SCENE), Box::new(ArenaScene));
    director.register(SceneKey::from(VILLAGE_SCENE), Box::new(VillageScene));
    director
}
