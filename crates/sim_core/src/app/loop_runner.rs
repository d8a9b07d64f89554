use std::env;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::ecs::World;

use super::scheduler::{FixedStepReport, FrameStepReport, Scheduler};
use super::transition::{SceneDirector, TransitionProgress};

pub const SLOW_FRAME_ENV_VAR: &str = "ARENA_SLOW_FRAME_MS";

#[derive(Debug, Clone, Default)]
pub struct LoopConfig {
    pub max_render_fps: Option<u32>,
    pub simulated_slow_frame_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    pub frame_dt: Duration,
    pub transition: TransitionProgress,
    pub fixed: FixedStepReport,
    pub frame: Option<FrameStepReport>,
    /// Time left in the frame budget under the render cap.
    pub cap_sleep: Duration,
}

/// Drives one displayed frame: poll the scene transition, run fixed ticks
/// for the elapsed time, then the frame step.
#[derive(Debug)]
pub struct FrameDriver {
    last_frame_instant: Option<Instant>,
    render_cap: Option<u32>,
    render_frame_target: Option<Duration>,
    slow_frame_delay: Duration,
}

impl FrameDriver {
    pub fn new(config: &LoopConfig) -> Self {
        let render_cap = normalize_render_fps_cap(config.max_render_fps);
        let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
        info!(
            slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
            render_fps_cap = %format_render_cap(render_cap),
            "loop_config"
        );
        Self {
            last_frame_instant: None,
            render_cap,
            render_frame_target: target_frame_duration(render_cap),
            slow_frame_delay,
        }
    }

    pub fn render_cap(&self) -> Option<u32> {
        self.render_cap
    }

    /// One frame at `now`. The first frame has a zero delta.
    pub fn frame(
        &mut self,
        now: Instant,
        scheduler: &mut Scheduler,
        director: Option<&mut SceneDirector>,
        world: &mut World,
    ) -> FrameOutcome {
        let frame_dt = self
            .last_frame_instant
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.last_frame_instant = Some(now);

        let transition = match director {
            Some(director) => director.poll(scheduler, world),
            None => TransitionProgress::Idle,
        };
        let fixed = scheduler.step_fixed(world, frame_dt);
        let frame = scheduler.step_frame(world, frame_dt);

        let elapsed = Instant::now().saturating_duration_since(now);
        FrameOutcome {
            frame_dt,
            transition,
            fixed,
            frame,
            cap_sleep: compute_cap_sleep(elapsed, self.render_frame_target),
        }
    }

    /// Wall-clock variant of [`FrameDriver::frame`] that also sleeps for the
    /// slow-frame perturbation and the render cap.
    pub fn run_frame(
        &mut self,
        scheduler: &mut Scheduler,
        director: Option<&mut SceneDirector>,
        world: &mut World,
    ) -> FrameOutcome {
        if self.slow_frame_delay > Duration::ZERO {
            // Explicit debug perturbation only; this is not the FPS cap.
            thread::sleep(self.slow_frame_delay);
        }
        let outcome = self.frame(Instant::now(), scheduler, director, world);
        if outcome.cap_sleep > Duration::ZERO {
            thread::sleep(outcome.cap_sleep);
        }
        outcome
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}
