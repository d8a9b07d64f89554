use tracing::{debug, trace};

use crate::bridge::Command;
use crate::ecs::{
    AnimationIntent, AnimationState, EffectAnchor, EffectIntent, Handle, NeedsView, Position,
    SoundIntent, SpriteView, World,
};

use super::system::{System, SystemContext};

pub const VIEW_SPAWN_PRIORITY: i32 = 100;
pub const INTENT_TRANSLATION_PRIORITY: i32 = 110;
pub const POSITION_SYNC_PRIORITY: i32 = 120;

/// Declares an animation for `handle`. Later requests in the same frame
/// replace earlier ones.
pub fn request_animation(
    world: &mut World,
    handle: Handle,
    animation: impl Into<String>,
    looping: bool,
) -> bool {
    if let Some(intent) = world.get_mut::<AnimationIntent>(handle) {
        intent.request(animation, looping);
        return true;
    }
    let mut intent = AnimationIntent::default();
    intent.request(animation, looping);
    world.insert(handle, intent).is_ok()
}

pub fn request_sound(world: &mut World, handle: Handle, sound: impl Into<String>) -> bool {
    if let Some(intent) = world.get_mut::<SoundIntent>(handle) {
        intent.request(sound);
        return true;
    }
    let mut intent = SoundIntent::default();
    intent.request(sound);
    world.insert(handle, intent).is_ok()
}

pub fn request_effect(
    world: &mut World,
    handle: Handle,
    effect: impl Into<String>,
    anchor: EffectAnchor,
) -> bool {
    if let Some(intent) = world.get_mut::<EffectIntent>(handle) {
        intent.request(effect, anchor);
        return true;
    }
    let mut intent = EffectIntent::default();
    intent.request(effect, anchor);
    world.insert(handle, intent).is_ok()
}

fn position_of(world: &World, handle: Handle) -> crate::ecs::Vec2 {
    world
        .get::<Position>(handle)
        .copied()
        .unwrap_or_default()
        .as_vec2()
}

/// Issues `SpawnView` for entities still marked [`NeedsView`].
#[derive(Debug, Default)]
pub struct ViewSpawnSystem;

impl System for ViewSpawnSystem {
    fn priority(&self) -> i32 {
        VIEW_SPAWN_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        for handle in context.world.query::<NeedsView>() {
            let position = position_of(context.world, handle);
            let Some(sprite) = context.world.get_mut::<SpriteView>(handle) else {
                trace!(entity = ?handle, "needs_view_without_sprite");
                continue;
            };
            sprite.last_sent_position = Some(position);
            let asset_key = sprite.asset_key.clone();
            context.world.remove::<NeedsView>(handle);
            debug!(entity = ?handle, asset_key = %asset_key, "view_spawn_requested");
            context.commands.push(Command::SpawnView {
                handle,
                asset_key,
                position,
            });
        }
    }
}

/// Sole consumer of the intent components. Each pending request becomes
/// one command and is cleared.
#[derive(Debug, Default)]
pub struct IntentTranslationSystem;

impl System for IntentTranslationSystem {
    fn priority(&self) -> i32 {
        INTENT_TRANSLATION_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        let world = &mut *context.world;

        for handle in world.query::<AnimationIntent>() {
            let Some(request) = world
                .get_mut::<AnimationIntent>(handle)
                .and_then(AnimationIntent::take)
            else {
                continue;
            };
            let state = AnimationState {
                current: Some(request.animation.clone()),
                looping: request.looping,
            };
            let _ = world.insert(handle, state);
            context.commands.push(Command::PlayAnimation {
                handle,
                animation: request.animation,
                looping: request.looping,
            });
        }

        for handle in world.query::<SoundIntent>() {
            if let Some(sound) = world.get_mut::<SoundIntent>(handle).and_then(SoundIntent::take) {
                context.commands.push(Command::PlaySfx { sound });
            }
        }

        for handle in world.query::<EffectIntent>() {
            let Some(request) = world
                .get_mut::<EffectIntent>(handle)
                .and_then(EffectIntent::take)
            else {
                continue;
            };
            let command = match request.anchor {
                EffectAnchor::Entity => Command::PlayEffectOn {
                    handle,
                    effect: request.effect,
                },
                EffectAnchor::Position => Command::PlayEffectAt {
                    effect: request.effect,
                    position: position_of(world, handle),
                },
            };
            context.commands.push(command);
        }
    }
}

/// Pushes `SetPosition` only when an entity moved since the last push.
#[derive(Debug, Default)]
pub struct PositionSyncSystem;

impl System for PositionSyncSystem {
    fn priority(&self) -> i32 {
        POSITION_SYNC_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        for handle in context.world.query2::<Position, SpriteView>() {
            if context.world.has::<NeedsView>(handle) {
                continue;
            }
            let position = position_of(context.world, handle);
            let Some(sprite) = context.world.get_mut::<SpriteView>(handle) else {
                continue;
            };
            if sprite.last_sent_position == Some(position) {
                continue;
            }
            sprite.last_sent_position = Some(position);
            context
                .commands
                .push(Command::SetPosition { handle, position });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::system::SortedSystemList;
    use crate::bridge::{CommandBuffer, CommandKind, EventBus};
    use crate::ecs::Vec2;

    fn render_list() -> SortedSystemList {
        let mut list = SortedSystemList::new();
        list.add(PositionSyncSystem);
        list.add(IntentTranslationSystem);
        list.add(ViewSpawnSystem);
        list
    }

    fn run_frame(list: &mut SortedSystemList, world: &mut World) -> Vec<Command> {
        let mut commands = CommandBuffer::new();
        let mut events = EventBus::new();
        let mut context = SystemContext {
            world,
            commands: &mut commands,
            events: &mut events,
            dt_seconds: 1.0 / 60.0,
        };
        list.update(&mut context);
        commands.flush()
    }

    fn spawn_sprite(world: &mut World, x: f32, y: f32) -> Handle {
        let handle = world.create();
        let _ = world.insert(handle, Position { x, y });
        let _ = world.insert(handle, SpriteView::new("sprite/goblin"));
        let _ = world.insert(handle, NeedsView);
        handle
    }

    #[test]
    fn view_spawn_runs_once_and_suppresses_redundant_position_sync() {
        let mut world = World::new();
        let mut list = render_list();
        let goblin = spawn_sprite(&mut world, 2.0, 3.0);

        let first = run_frame(&mut list, &mut world);
        let second = run_frame(&mut list, &mut world);

        assert_eq!(
            first,
            vec![Command::SpawnView {
                handle: goblin,
                asset_key: "sprite/goblin".to_string(),
                position: Vec2 { x: 2.0, y: 3.0 },
            }]
        );
        assert!(second.is_empty());
        assert!(!world.has::<NeedsView>(goblin));
    }

    #[test]
    fn moved_entities_get_one_set_position() {
        let mut world = World::new();
        let mut list = render_list();
        let goblin = spawn_sprite(&mut world, 0.0, 0.0);
        run_frame(&mut list, &mut world);

        world.get_mut::<Position>(goblin).expect("position").x = 4.0;
        let moved = run_frame(&mut list, &mut world);

        assert_eq!(
            moved,
            vec![Command::SetPosition {
                handle: goblin,
                position: Vec2 { x: 4.0, y: 0.0 },
            }]
        );
        assert!(run_frame(&mut list, &mut world).is_empty());
    }

    #[test]
    fn last_animation_request_wins_and_intent_is_cleared() {
        let mut world = World::new();
        let mut list = render_list();
        let goblin = spawn_sprite(&mut world, 0.0, 0.0);
        run_frame(&mut list, &mut world);

        assert!(request_animation(&mut world, goblin, "attack", false));
        assert!(request_animation(&mut world, goblin, "hit", false));
        let commands = run_frame(&mut list, &mut world);

        let animations: Vec<_> = commands
            .iter()
            .filter(|command| command.kind() == CommandKind::PlayAnimation)
            .collect();
        assert_eq!(
            animations,
            vec![&Command::PlayAnimation {
                handle: goblin,
                animation: "hit".to_string(),
                looping: false,
            }]
        );
        assert!(world
            .get::<AnimationIntent>(goblin)
            .expect("intent")
            .pending()
            .is_none());
        assert_eq!(
            world
                .get::<AnimationState>(goblin)
                .and_then(|state| state.current.as_deref()),
            Some("hit")
        );
        assert!(run_frame(&mut list, &mut world).is_empty());
    }

    #[test]
    fn sound_and_effect_intents_translate_by_anchor() {
        let mut world = World::new();
        let mut list = render_list();
        let goblin = spawn_sprite(&mut world, 1.0, 1.0);
        run_frame(&mut list, &mut world);

        request_sound(&mut world, goblin, "sfx/hit");
        request_effect(&mut world, goblin, "fx/spark", EffectAnchor::Position);
        let commands = run_frame(&mut list, &mut world);

        assert_eq!(
            commands,
            vec![
                Command::PlaySfx {
                    sound: "sfx/hit".to_string()
                },
                Command::PlayEffectAt {
                    effect: "fx/spark".to_string(),
                    position: Vec2 { x: 1.0, y: 1.0 },
                },
            ]
        );

        request_effect(&mut world, goblin, "fx/aura", EffectAnchor::Entity);
        assert_eq!(
            run_frame(&mut list, &mut world),
            vec![Command::PlayEffectOn {
                handle: goblin,
                effect: "fx/aura".to_string(),
            }]
        );
    }
}
