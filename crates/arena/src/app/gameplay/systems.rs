use sim_core::app::{request_animation, request_effect, request_sound};
use sim_core::ecs::{
    CharacterStats, Dying, EffectAnchor, Handle, Health, NeedsView, Position, SpriteView, Vec2,
};
use sim_core::persistence::{ConfigDatabase, PLAYER_NAME};
use sim_core::{EventBus, Scheduler, System, SystemContext, World};
use tracing::{debug, info, warn};

pub(crate) const DRIFT_PRIORITY: i32 = 10;
pub(crate) const ATTRITION_PRIORITY: i32 = 40;
pub(crate) const WAVE_CLEARED_TOPIC: &str = "ui.wave_cleared";
pub(crate) const PLAYER_DEF: (&str, &str) = ("character", "ranger");

/// Constant velocity in world units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Drift {
    pub(crate) velocity: Vec2,
}

/// Loses one health point every `interval_seconds`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Attrition {
    pub(crate) interval_seconds: f32,
    pub(crate) elapsed_seconds: f32,
}

impl Attrition {
    pub(crate) fn every(interval_seconds: f32) -> Self {
        Self {
            interval_seconds,
            elapsed_seconds: 0.0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DriftSystem;

impl System for DriftSystem {
    fn priority(&self) -> i32 {
        DRIFT_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        for handle in context.world.query2::<Drift, Position>() {
            if context.world.has::<Dying>(handle) {
                continue;
            }
            let Some(velocity) = context.world.get::<Drift>(handle).map(|drift| drift.velocity)
            else {
                continue;
            };
            if let Some(position) = context.world.get_mut::<Position>(handle) {
                position.x += velocity.x * context.dt_seconds;
                position.y += velocity.y * context.dt_seconds;
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct AttritionSystem;

impl System for AttritionSystem {
    fn priority(&self) -> i32 {
        ATTRITION_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        let world = &mut *context.world;
        for handle in world.query2::<Attrition, Health>() {
            if world.has::<Dying>(handle) {
                continue;
            }
            let due = match world.get_mut::<Attrition>(handle) {
                Some(attrition) => {
                    attrition.elapsed_seconds += context.dt_seconds;
                    if attrition.elapsed_seconds >= attrition.interval_seconds {
                        attrition.elapsed_seconds -= attrition.interval_seconds;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            };
            if due {
                wound(world, handle);
            }
        }
    }
}

fn wound(world: &mut World, handle: Handle) {
    let Some(health) = world.get_mut::<Health>(handle) else {
        return;
    };
    health.current -= 1;
    let remaining = health.current;
    request_animation(world, handle, "hit", false);
    request_sound(world, handle, "sfx/hit");
    request_effect(world, handle, "fx/spark", EffectAnchor::Position);
    debug!(entity = ?handle, remaining, "entity_wounded");
}

pub(crate) fn install_gameplay_systems(scheduler: &mut Scheduler) {
    scheduler.add_fixed(DriftSystem);
    scheduler.add_fixed(AttritionSystem);
    if let Some(events) = scheduler.events_mut() {
        subscribe_ui_events(events);
    }
}

fn subscribe_ui_events(events: &mut EventBus) {
    events.subscribe(WAVE_CLEARED_TOPIC, |event, _context| {
        if let sim_core::Event::Ui { payload, .. } = event {
            info!(payload = %payload, "wave_cleared");
        }
    });
}

/// The player is deliberately left without a scene scope so it survives
/// every transition.
pub(crate) fn spawn_player(world: &mut World, defs: &ConfigDatabase) -> Handle {
    let player = world.create_named(PLAYER_NAME);
    let _ = world.insert(player, Position::default());
    let _ = world.insert(player, SpriteView::new("sprite/ranger"));
    let _ = world.insert(player, NeedsView);

    match defs.get(PLAYER_DEF.0, PLAYER_DEF.1) {
        Some(def) => {
            let _ = world.insert(player, Health::new(def.health_max.unwrap_or(10)));
            let _ = world.insert(
                player,
                CharacterStats {
                    config: def.clone(),
                    level: 1,
                    experience: 0,
                },
            );
        }
        None => {
            warn!(
                kind = PLAYER_DEF.0,
                def_name = PLAYER_DEF.1,
                "player_def_missing"
            );
            let _ = world.insert(player, Health::new(10));
        }
    }
    player
}
