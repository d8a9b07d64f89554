use tracing::{info, warn};

use super::destruction::{
    install_death_handler, DeathCountdownSystem, DeathSystem, DestructionConfig,
};
use super::presentation_sync::{IntentTranslationSystem, PositionSyncSystem, ViewSpawnSystem};
use super::scheduler::Scheduler;

/// Registers the built-in fixed and render systems plus the terminal
/// animation handler. Call again after a load replaces the world only if
/// the scheduler itself was rebuilt.
pub fn install_core_systems(scheduler: &mut Scheduler, destruction: DestructionConfig) {
    scheduler.add_fixed(DeathSystem::new(destruction));
    scheduler.add_fixed(DeathCountdownSystem);
    scheduler.add_render(ViewSpawnSystem);
    scheduler.add_render(IntentTranslationSystem);
    scheduler.add_render(PositionSyncSystem);

    match scheduler.events_mut() {
        Some(events) => {
            install_death_handler(events);
        }
        None => warn!(
            operation = "install_core_systems",
            "scheduler_wiring_missing"
        ),
    }
    info!(
        fixed = scheduler.fixed_systems().len(),
        render = scheduler.render_systems().len(),
        "core_systems_installed"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app::scheduler::SchedulerConfig;
    use crate::ecs::World;

    #[test]
    fn installs_systems_into_their_bands() {
        let mut scheduler = Scheduler::with_queues(SchedulerConfig::default());
        install_core_systems(&mut scheduler, DestructionConfig::default());
        let mut world = World::new();

        scheduler.step_fixed(&mut world, Duration::from_millis(20));
        scheduler.step_frame(&mut world, Duration::from_millis(20));

        assert_eq!(
            scheduler.fixed_systems().system_order(),
            "DeathSystem>DeathCountdownSystem"
        );
        assert_eq!(
            scheduler.render_systems().system_order(),
            "ViewSpawnSystem>IntentTranslationSystem>PositionSyncSystem"
        );
        assert_eq!(
            scheduler.events_mut().expect("events").subscription_count(),
            1
        );
    }
}
