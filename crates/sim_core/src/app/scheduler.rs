use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::bridge::{CommandBuffer, EventBus, PresentationSink};
use crate::ecs::World;

use super::metrics::{MetricsAccumulator, MetricsHandle};
use super::system::{SortedSystemList, System, SystemContext};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub target_tps: u32,
    /// Upper bound on banked simulation time. Anything beyond it is
    /// discarded rather than simulated.
    pub max_accumulator: Duration,
    pub metrics_log_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_accumulator: Duration::from_millis(250),
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Running,
    /// A scene change is in flight; only the transition list runs.
    Transition,
    /// UI-only ticking; same restricted execution as `Transition`.
    Paused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedStepReport {
    pub ticks_run: u32,
    pub dropped_backlog: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStepReport {
    pub mode: SchedulerMode,
    pub events_dispatched: usize,
    pub commands_flushed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_units: u128,
    dropped_units: u128,
}

/// Time is banked in "tick units": nanoseconds multiplied by the tick rate,
/// so one fixed tick is exactly `NANOS_PER_SECOND` units and no rounding
/// ever enters the tick count.
fn plan_fixed_steps(accumulator_units: u128, frame_units: u128, max_units: u128) -> StepPlan {
    let banked = accumulator_units.saturating_add(frame_units);
    let (banked, dropped_units) = if banked > max_units {
        (max_units, banked - max_units)
    } else {
        (banked, 0)
    };
    let ticks = banked / NANOS_PER_SECOND;
    StepPlan {
        ticks_to_run: u32::try_from(ticks).unwrap_or(u32::MAX),
        remaining_units: banked % NANOS_PER_SECOND,
        dropped_units,
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    tps: u32,
    fixed_dt_seconds: f32,
    mode: SchedulerMode,
    accumulator_units: u128,
    fixed: SortedSystemList,
    render: SortedSystemList,
    transition: SortedSystemList,
    commands: Option<CommandBuffer>,
    events: Option<EventBus>,
    presentation: Option<Box<dyn PresentationSink>>,
    wiring_warned: bool,
    presentation_warned: bool,
    total_ticks: u64,
    metrics: MetricsAccumulator,
    metrics_handle: MetricsHandle,
}

impl Scheduler {
    /// A scheduler with no queues attached. Steps are no-ops until both a
    /// [`CommandBuffer`] and an [`EventBus`] are wired in.
    pub fn new(config: SchedulerConfig) -> Self {
        let tps = config.target_tps.max(1);
        let metrics_interval = if config.metrics_log_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            config.metrics_log_interval
        };
        Self {
            fixed_dt_seconds: 1.0 / tps as f32,
            tps,
            config,
            mode: SchedulerMode::Running,
            accumulator_units: 0,
            fixed: SortedSystemList::new(),
            render: SortedSystemList::new(),
            transition: SortedSystemList::new(),
            commands: None,
            events: None,
            presentation: None,
            wiring_warned: false,
            presentation_warned: false,
            total_ticks: 0,
            metrics: MetricsAccumulator::new(metrics_interval),
            metrics_handle: MetricsHandle::default(),
        }
    }

    pub fn with_queues(config: SchedulerConfig) -> Self {
        let mut scheduler = Self::new(config);
        scheduler.attach_commands(CommandBuffer::new());
        scheduler.attach_events(EventBus::new());
        scheduler
    }

    pub fn attach_commands(&mut self, commands: CommandBuffer) {
        self.commands = Some(commands);
        self.wiring_warned = false;
    }

    pub fn attach_events(&mut self, events: EventBus) {
        self.events = Some(events);
        self.wiring_warned = false;
    }

    pub fn attach_presentation(&mut self, presentation: Box<dyn PresentationSink>) {
        self.presentation = Some(presentation);
        self.presentation_warned = false;
    }

    pub fn detach_presentation(&mut self) -> Option<Box<dyn PresentationSink>> {
        self.presentation.take()
    }

    pub fn commands_mut(&mut self) -> Option<&mut CommandBuffer> {
        self.commands.as_mut()
    }

    pub fn events_mut(&mut self) -> Option<&mut EventBus> {
        self.events.as_mut()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn add_fixed<S: System>(&mut self, system: S) -> bool {
        self.fixed.add(system)
    }

    pub fn add_render<S: System>(&mut self, system: S) -> bool {
        self.render.add(system)
    }

    pub fn add_transition<S: System>(&mut self, system: S) -> bool {
        self.transition.add(system)
    }

    pub fn fixed_systems_mut(&mut self) -> &mut SortedSystemList {
        &mut self.fixed
    }

    pub fn render_systems_mut(&mut self) -> &mut SortedSystemList {
        &mut self.render
    }

    pub fn transition_systems_mut(&mut self) -> &mut SortedSystemList {
        &mut self.transition
    }

    pub fn fixed_systems(&self) -> &SortedSystemList {
        &self.fixed
    }

    pub fn render_systems(&self) -> &SortedSystemList {
        &self.render
    }

    pub fn mode(&self) -> SchedulerMode {
        self.mode
    }

    pub fn pause(&mut self) {
        self.set_mode(SchedulerMode::Paused);
    }

    pub fn resume(&mut self) {
        self.set_mode(SchedulerMode::Running);
    }

    pub fn enter_transition(&mut self) {
        self.set_mode(SchedulerMode::Transition);
    }

    /// Any mode change empties the accumulator so returning to `Running`
    /// never triggers a burst of catch-up ticks.
    pub fn set_mode(&mut self, mode: SchedulerMode) {
        if self.mode == mode {
            return;
        }
        info!(from = ?self.mode, to = ?mode, "scheduler_mode_changed");
        self.mode = mode;
        self.accumulator_units = 0;
    }

    pub fn fixed_dt_seconds(&self) -> f32 {
        self.fixed_dt_seconds
    }

    pub fn fixed_delta(&self) -> Duration {
        Duration::from_nanos((NANOS_PER_SECOND / self.tps as u128) as u64)
    }

    pub fn accumulator(&self) -> Duration {
        let nanos = self.accumulator_units / self.tps as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn metrics_handle(&self) -> MetricsHandle {
        self.metrics_handle.clone()
    }

    /// Banks `dt` and runs as many fixed ticks as fit. Each tick first
    /// dispatches pending events, then runs the fixed list with the same
    /// fixed delta. Outside `Running` no time is banked.
    pub fn step_fixed(&mut self, world: &mut World, dt: Duration) -> FixedStepReport {
        let (Some(commands), Some(events)) = (self.commands.as_mut(), self.events.as_mut()) else {
            if !self.wiring_warned {
                warn!(operation = "step_fixed", "scheduler_wiring_missing");
                self.wiring_warned = true;
            }
            return FixedStepReport::default();
        };
        if self.mode != SchedulerMode::Running {
            return FixedStepReport::default();
        }

        let tps = self.tps as u128;
        let plan = plan_fixed_steps(
            self.accumulator_units,
            dt.as_nanos().saturating_mul(tps),
            self.config.max_accumulator.as_nanos().saturating_mul(tps),
        );

        for _ in 0..plan.ticks_to_run {
            events.dispatch(world, commands);
            let mut context = SystemContext {
                world: &mut *world,
                commands: &mut *commands,
                events: &mut *events,
                dt_seconds: self.fixed_dt_seconds,
            };
            self.fixed.update(&mut context);
            self.total_ticks = self.total_ticks.saturating_add(1);
        }
        self.accumulator_units = plan.remaining_units;

        let dropped_backlog = Duration::from_nanos(
            u64::try_from(plan.dropped_units / tps).unwrap_or(u64::MAX),
        );
        if !dropped_backlog.is_zero() {
            debug!(
                dropped_backlog_ms = dropped_backlog.as_millis() as u64,
                "fixed_step_backlog_dropped"
            );
        }
        self.metrics.record_ticks(plan.ticks_to_run, dropped_backlog);

        FixedStepReport {
            ticks_run: plan.ticks_to_run,
            dropped_backlog,
        }
    }

    /// Once per displayed frame. Runs the render list (or, outside
    /// `Running`, the transition list plus an event flush), then always
    /// hands queued commands to the presentation and advances its timers.
    pub fn step_frame(&mut self, world: &mut World, dt: Duration) -> Option<FrameStepReport> {
        let (Some(commands), Some(events)) = (self.commands.as_mut(), self.events.as_mut()) else {
            if !self.wiring_warned {
                warn!(operation = "step_frame", "scheduler_wiring_missing");
                self.wiring_warned = true;
            }
            return None;
        };

        let dt_seconds = dt.as_secs_f32();
        let mut events_dispatched = 0;
        match self.mode {
            SchedulerMode::Running => {
                let mut context = SystemContext {
                    world: &mut *world,
                    commands: &mut *commands,
                    events: &mut *events,
                    dt_seconds,
                };
                self.render.update(&mut context);
            }
            SchedulerMode::Transition | SchedulerMode::Paused => {
                let mut context = SystemContext {
                    world: &mut *world,
                    commands: &mut *commands,
                    events: &mut *events,
                    dt_seconds,
                };
                self.transition.update(&mut context);
                events_dispatched = events.dispatch(world, commands);
            }
        }

        let mut commands_flushed = 0;
        match self.presentation.as_mut() {
            Some(presentation) => {
                let flushed = commands.flush();
                commands_flushed = flushed.len();
                for command in flushed {
                    presentation.apply(command);
                }
                presentation.advance_frame(dt_seconds, events);
            }
            None => {
                if !self.presentation_warned && !commands.is_empty() {
                    warn!(
                        pending = commands.len(),
                        "presentation_missing_commands_held"
                    );
                    self.presentation_warned = true;
                }
            }
        }

        self.metrics.record_frame(dt, commands_flushed);
        if let Some(snapshot) = self.metrics.maybe_snapshot(Instant::now()) {
            self.metrics_handle.publish(snapshot);
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                dropped_backlog_ms = snapshot.dropped_backlog_ms,
                commands_per_frame = snapshot.commands_per_frame,
                "loop_metrics"
            );
        }

        Some(FrameStepReport {
            mode: self.mode,
            events_dispatched,
            commands_flushed,
        })
    }
}
