use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    /// Wall-clock time discarded by the accumulator clamp during the interval.
    pub dropped_backlog_ms: f32,
    pub commands_per_frame: f32,
}

/// Cloneable read side of the scheduler's loop metrics.
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Option<Instant>,
    interval: Duration,
    frames: u32,
    ticks: u32,
    commands: u64,
    frame_time_sum: Duration,
    dropped_backlog: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: None,
            interval,
            frames: 0,
            ticks: 0,
            commands: 0,
            frame_time_sum: Duration::ZERO,
            dropped_backlog: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration, commands_flushed: usize) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
        self.commands = self.commands.saturating_add(commands_flushed as u64);
    }

    pub(crate) fn record_ticks(&mut self, ticks: u32, dropped_backlog: Duration) {
        self.ticks = self.ticks.saturating_add(ticks);
        self.dropped_backlog = self.dropped_backlog.saturating_add(dropped_backlog);
    }

    /// Emits a snapshot once `interval` has elapsed since the first call.
    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let interval_start = *self.interval_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let (frame_time_ms, commands_per_frame) = if self.frames == 0 {
            (0.0, 0.0)
        } else {
            (
                (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0,
                self.commands as f32 / self.frames as f32,
            )
        };

        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
            dropped_backlog_ms: self.dropped_backlog.as_secs_f32() * 1000.0,
            commands_per_frame,
        };

        self.interval_start = Some(now);
        self.frames = 0;
        self.ticks = 0;
        self.commands = 0;
        self.frame_time_sum = Duration::ZERO;
        self.dropped_backlog = Duration::ZERO;

        Some(snapshot)
    }
}
