use super::command::Command;
use super::event::EventBus;

/// Presentation-side consumer of [`Command`]s.
///
/// Implementations must tolerate commands whose target view is missing or
/// already destroyed. Asset loads and playback are fire-and-forget: `apply`
/// never blocks the simulation, and a "not ready yet" outcome is handled on
/// the presentation side.
pub trait PresentationSink {
    fn apply(&mut self, command: Command);

    /// Runs once per displayed frame in every scheduler mode. Presentation
    /// timers (particle lifetimes, animation playback) advance here and may
    /// report back through `events`.
    fn advance_frame(&mut self, _dt_seconds: f32, _events: &mut EventBus) {}
}
