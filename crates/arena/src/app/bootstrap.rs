use std::env;
use std::str::FromStr;
use std::time::Duration;

use sim_core::{DestructionConfig, LoopConfig, SchedulerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TARGET_TPS_ENV_VAR: &str = "ARENA_TARGET_TPS";
const RUN_SECONDS_ENV_VAR: &str = "ARENA_RUN_SECONDS";
const MAX_RENDER_FPS_ENV_VAR: &str = "ARENA_MAX_RENDER_FPS";

const DEFAULT_TARGET_TPS: u32 = 60;
const DEFAULT_RUN_SECONDS: u64 = 5;
const DEFAULT_MAX_RENDER_FPS: u32 = 60;
pub(crate) const SAVE_SLOT: u32 = 0;

pub(crate) struct AppWiring {
    pub(crate) scheduler: SchedulerConfig,
    pub(crate) frame_loop: LoopConfig,
    pub(crate) destruction: DestructionConfig,
    pub(crate) run_for: Duration,
    pub(crate) save_slot: u32,
}

impl Default for AppWiring {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig {
                target_tps: DEFAULT_TARGET_TPS,
                ..SchedulerConfig::default()
            },
            frame_loop: LoopConfig {
                max_render_fps: Some(DEFAULT_MAX_RENDER_FPS),
                ..LoopConfig::default()
            },
            destruction: DestructionConfig::default(),
            run_for: Duration::from_secs(DEFAULT_RUN_SECONDS),
            save_slot: SAVE_SLOT,
        }
    }
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Arena Startup ===");

    let defaults = AppWiring::default();
    let target_tps = parse_env_or(TARGET_TPS_ENV_VAR, defaults.scheduler.target_tps);
    let run_seconds = parse_env_or(RUN_SECONDS_ENV_VAR, DEFAULT_RUN_SECONDS);
    let max_render_fps = parse_env_or(MAX_RENDER_FPS_ENV_VAR, DEFAULT_MAX_RENDER_FPS);

    let wiring = AppWiring {
        scheduler: SchedulerConfig {
            target_tps: target_tps.max(1),
            ..defaults.scheduler
        },
        frame_loop: LoopConfig {
            max_render_fps: Some(max_render_fps),
            ..defaults.frame_loop
        },
        run_for: Duration::from_secs(run_seconds),
        ..defaults
    };
    info!(
        target_tps = wiring.scheduler.target_tps,
        run_seconds,
        max_render_fps,
        "app_config"
    );
    wiring
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_env_or<T>(var: &'static str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(var) {
        Ok(raw) => parse_value_or(var, raw.trim(), default),
        Err(env::VarError::NotPresent) => default,
        Err(err) => {
            warn!(env_var = var, error = %err, "unable to read env var; using default");
            default
        }
    }
}

fn parse_value_or<T>(var: &'static str, raw: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = var, value = raw, "invalid env var value; using default");
            default
        }
    }
}
