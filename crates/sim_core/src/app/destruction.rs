use tracing::{debug, trace};

use crate::bridge::{
    Command, CommandBuffer, Event, EventBus, SubscriptionId, TOPIC_ANIMATION_FINISHED,
};
use crate::ecs::{AnimationIntent, AnimationState, DeathCountdown, Dying, Handle, Health, World};

use super::system::{System, SystemContext};

pub const DEATH_SYSTEM_PRIORITY: i32 = 80;
pub const DEATH_COUNTDOWN_PRIORITY: i32 = 85;

#[derive(Debug, Clone, PartialEq)]
pub struct DestructionConfig {
    pub terminal_animation: String,
    /// Teardown happens after this long even if the presentation never
    /// reports the terminal animation as finished.
    pub fallback_timeout_seconds: f32,
}

impl Default for DestructionConfig {
    fn default() -> Self {
        Self {
            terminal_animation: "death".to_string(),
            fallback_timeout_seconds: 2.0,
        }
    }
}

/// Moves entities whose health ran out into the dying phase. The entity
/// stays in the world until its terminal animation finishes or the
/// countdown expires.
#[derive(Debug, Default)]
pub struct DeathSystem {
    config: DestructionConfig,
}

impl DeathSystem {
    pub fn new(config: DestructionConfig) -> Self {
        Self { config }
    }
}

impl System for DeathSystem {
    fn priority(&self) -> i32 {
        DEATH_SYSTEM_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        let world = &mut *context.world;
        for handle in world.query::<Health>() {
            let depleted = world
                .get::<Health>(handle)
                .is_some_and(Health::is_depleted);
            if !depleted || world.has::<Dying>(handle) {
                continue;
            }
            begin_dying(world, handle, &self.config);
        }
    }
}

fn begin_dying(world: &mut World, handle: Handle, config: &DestructionConfig) {
    let _ = world.insert(
        handle,
        Dying {
            terminal_animation: config.terminal_animation.clone(),
        },
    );
    let _ = world.insert(
        handle,
        DeathCountdown {
            remaining_seconds: config.fallback_timeout_seconds,
        },
    );
    match world.get_mut::<AnimationIntent>(handle) {
        Some(intent) => intent.request(config.terminal_animation.clone(), false),
        None => {
            let mut intent = AnimationIntent::default();
            intent.request(config.terminal_animation.clone(), false);
            let _ = world.insert(handle, intent);
        }
    }
    debug!(entity = ?handle, animation = %config.terminal_animation, "entity_dying");
}

#[derive(Debug, Default)]
pub struct DeathCountdownSystem;

impl System for DeathCountdownSystem {
    fn priority(&self) -> i32 {
        DEATH_COUNTDOWN_PRIORITY
    }

    fn update(&mut self, context: &mut SystemContext<'_>) {
        let dt = context.dt_seconds;
        for handle in context.world.query::<DeathCountdown>() {
            let expired = match context.world.get_mut::<DeathCountdown>(handle) {
                Some(countdown) => {
                    countdown.remaining_seconds -= dt;
                    countdown.remaining_seconds <= 0.0
                }
                None => false,
            };
            if expired {
                debug!(entity = ?handle, "death_countdown_expired");
                teardown_entity(context.world, context.commands, handle);
            }
        }
    }
}

/// Final removal: the view goes first, then the entity. Stale handles are
/// ignored, so calling this twice for one entity is harmless.
pub fn teardown_entity(world: &mut World, commands: &mut CommandBuffer, handle: Handle) -> bool {
    if !world.is_valid(handle) {
        return false;
    }
    commands.push(Command::DestroyView { handle });
    world.destroy(handle)
}

/// Tears down a dying entity once the presentation reports its terminal
/// animation as finished. Returns whether a teardown happened.
pub fn handle_animation_finished(
    world: &mut World,
    commands: &mut CommandBuffer,
    handle: Handle,
    animation: &str,
) -> bool {
    if !world.is_valid(handle) {
        trace!(entity = ?handle, "animation_finished_for_stale_handle");
        return false;
    }
    let Some(dying) = world.get::<Dying>(handle) else {
        return false;
    };
    if dying.terminal_animation != animation {
        return false;
    }
    let playing_terminal = world
        .get::<AnimationState>(handle)
        .and_then(|state| state.current.as_deref())
        == Some(animation);
    if !playing_terminal {
        return false;
    }
    debug!(entity = ?handle, animation, "terminal_animation_finished");
    teardown_entity(world, commands, handle)
}

pub fn install_death_handler(events: &mut EventBus) -> SubscriptionId {
    events.subscribe(TOPIC_ANIMATION_FINISHED, |event, context| {
        if let Event::AnimationFinished { handle, animation } = event {
            handle_animation_finished(context.world, context.commands, *handle, animation);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::system::SortedSystemList;
    use crate::bridge::CommandKind;

    fn run_fixed(
        list: &mut SortedSystemList,
        world: &mut World,
        commands: &mut CommandBuffer,
        events: &mut EventBus,
        dt_seconds: f32,
    ) {
        events.dispatch(world, commands);
        let mut context = SystemContext {
            world,
            commands,
            events,
            dt_seconds,
        };
        list.update(&mut context);
    }

    fn destruction_list() -> SortedSystemList {
        let mut list = SortedSystemList::new();
        list.add(DeathSystem::default());
        list.add(DeathCountdownSystem);
        list
    }

    #[test]
    fn depleted_health_marks_dying_once() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut events = EventBus::new();
        let mut list = destruction_list();
        let goblin = world.create();
        let _ = world.insert(goblin, Health { current: 0, max: 10 });

        run_fixed(&mut list, &mut world, &mut commands, &mut events, 0.1);
        world
            .get_mut::<AnimationIntent>(goblin)
            .expect("intent")
            .take();
        run_fixed(&mut list, &mut world, &mut commands, &mut events, 0.1);

        assert!(world.has::<Dying>(goblin));
        assert!(world
            .get::<AnimationIntent>(goblin)
            .expect("intent")
            .pending()
            .is_none());
        let countdown = world.get::<DeathCountdown>(goblin).expect("countdown");
        assert!((countdown.remaining_seconds - 1.8).abs() < 1e-4);
        assert!(commands.is_empty());
    }

    #[test]
    fn finished_terminal_animation_tears_down_exactly_once() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut events = EventBus::new();
        install_death_handler(&mut events);
        let mut list = destruction_list();
        let goblin = world.create();
        let _ = world.insert(goblin, Health { current: -3, max: 10 });
        run_fixed(&mut list, &mut world, &mut commands, &mut events, 0.1);
        let _ = world.insert(
            goblin,
            AnimationState {
                current: Some("death".to_string()),
                looping: false,
            },
        );

        for _ in 0..2 {
            events.push(Event::AnimationFinished {
                handle: goblin,
                animation: "death".to_string(),
            });
        }
        run_fixed(&mut list, &mut world, &mut commands, &mut events, 0.1);

        assert!(!world.is_valid(goblin));
        let destroyed: Vec<_> = commands
            .flush()
            .into_iter()
            .filter(|command| command.kind() == CommandKind::DestroyView)
            .collect();
        assert_eq!(destroyed, vec![Command::DestroyView { handle: goblin }]);
    }

    #[test]
    fn other_animations_do_not_trigger_teardown() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let goblin = world.create();
        let _ = world.insert(
            goblin,
            Dying {
                terminal_animation: "death".to_string(),
            },
        );
        let _ = world.insert(
            goblin,
            AnimationState {
                current: Some("hit".to_string()),
                looping: false,
            },
        );

        assert!(!handle_animation_finished(&mut world, &mut commands, goblin, "hit"));
        assert!(!handle_animation_finished(&mut world, &mut commands, goblin, "death"));
        assert!(world.is_valid(goblin));
        assert!(commands.is_empty());
    }

    #[test]
    fn countdown_tears_down_when_presentation_stays_silent() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut events = EventBus::new();
        let mut list = SortedSystemList::new();
        list.add(DeathSystem::new(DestructionConfig {
            terminal_animation: "collapse".to_string(),
            fallback_timeout_seconds: 0.5,
        }));
        list.add(DeathCountdownSystem);
        let goblin = world.create();
        let _ = world.insert(goblin, Health { current: 0, max: 4 });

        for _ in 0..6 {
            run_fixed(&mut list, &mut world, &mut commands, &mut events, 0.1);
        }

        assert!(!world.is_valid(goblin));
        assert_eq!(commands.flush(), vec![Command::DestroyView { handle: goblin }]);
    }

    #[test]
    fn teardown_of_stale_handle_is_ignored() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let goblin = world.create();

        assert!(teardown_entity(&mut world, &mut commands, goblin));
        assert!(!teardown_entity(&mut world, &mut commands, goblin));
        assert_eq!(commands.len(), 1);
    }
}
