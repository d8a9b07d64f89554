use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use sim_core::app::{AssetPreloader, SceneKey, TransitionError, TransitionReport, TransitionUi};
use sim_core::{Command, Event, EventBus, Handle, PresentationSink};
use tracing::{debug, info, warn};

/// Playback length of every one-shot animation in the headless view layer.
pub(crate) const ONE_SHOT_ANIMATION_SECONDS: f32 = 0.4;

const ASSET_MANIFEST: &[&str] = &[
    "sprite/ranger",
    "sprite/slime",
    "sprite/villager",
    "sfx/hit",
    "fx/spark",
    "bgm/arena",
    "bgm/village",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PresentationStats {
    pub(crate) commands_applied: u64,
    pub(crate) views_spawned: u64,
    pub(crate) views_destroyed: u64,
    pub(crate) live_views: usize,
    pub(crate) animations_finished: u64,
    pub(crate) current_bgm: Option<String>,
}

struct PlayingAnimation {
    handle: Handle,
    animation: String,
    remaining_seconds: f32,
}

/// Headless stand-in for a renderer: tracks live views, logs commands and
/// reports one-shot animations as finished after a fixed playback time.
pub(crate) struct LoggingPresentation {
    live_views: HashSet<Handle>,
    playing: Vec<PlayingAnimation>,
    stats: Rc<RefCell<PresentationStats>>,
}

impl LoggingPresentation {
    pub(crate) fn new() -> (Self, Rc<RefCell<PresentationStats>>) {
        let stats = Rc::new(RefCell::new(PresentationStats::default()));
        let presentation = Self {
            live_views: HashSet::new(),
            playing: Vec::new(),
            stats: Rc::clone(&stats),
        };
        (presentation, stats)
    }

    fn sync_stats(&self) {
        self.stats.borrow_mut().live_views = self.live_views.len();
    }
}

impl PresentationSink for LoggingPresentation {
    fn apply(&mut self, command: Command) {
        self.stats.borrow_mut().commands_applied += 1;
        match command {
            Command::SpawnView {
                handle, asset_key, ..
            } => {
                if !self.live_views.insert(handle) {
                    warn!(entity = ?handle, "view_spawned_twice");
                }
                self.stats.borrow_mut().views_spawned += 1;
                debug!(entity = ?handle, asset_key = asset_key.as_str(), "view_spawned");
            }
            Command::SetPosition { handle, position } => {
                if !self.live_views.contains(&handle) {
                    debug!(entity = ?handle, "set_position_without_view");
                    return;
                }
                debug!(entity = ?handle, x = position.x, y = position.y, "view_moved");
            }
            Command::PlayAnimation {
                handle,
                animation,
                looping,
            } => {
                if !self.live_views.contains(&handle) {
                    debug!(entity = ?handle, animation = animation.as_str(), "animation_without_view");
                    return;
                }
                // A new request on the same view replaces the one playing.
                self.playing.retain(|playing| playing.handle != handle);
                if !looping {
                    self.playing.push(PlayingAnimation {
                        handle,
                        animation,
                        remaining_seconds: ONE_SHOT_ANIMATION_SECONDS,
                    });
                }
            }
            Command::PlayEffectAt { effect, position } => {
                debug!(effect = effect.as_str(), x = position.x, y = position.y, "effect_at");
            }
            Command::PlayEffectOn { handle, effect } => {
                debug!(entity = ?handle, effect = effect.as_str(), "effect_on");
            }
            Command::PlaySfx { sound } => {
                debug!(sound = sound.as_str(), "sfx");
            }
            Command::PlayBgm { track } => {
                info!(track = track.as_str(), "bgm_changed");
                self.stats.borrow_mut().current_bgm = Some(track);
            }
            Command::DestroyView { handle } => {
                if self.live_views.remove(&handle) {
                    self.stats.borrow_mut().views_destroyed += 1;
                } else {
                    debug!(entity = ?handle, "destroy_without_view");
                }
                self.playing.retain(|playing| playing.handle != handle);
            }
        }
        self.sync_stats();
    }

    fn advance_frame(&mut self, dt_seconds: f32, events: &mut EventBus) {
        let mut finished = 0;
        self.playing.retain_mut(|playing| {
            playing.remaining_seconds -= dt_seconds;
            if playing.remaining_seconds > 0.0 {
                return true;
            }
            events.push(Event::AnimationFinished {
                handle: playing.handle,
                animation: std::mem::take(&mut playing.animation),
            });
            finished += 1;
            false
        });
        if finished > 0 {
            self.stats.borrow_mut().animations_finished += finished;
        }
    }
}

/// Accepts only the keys listed in the built-in asset manifest.
#[derive(Debug)]
pub(crate) struct ManifestPreloader {
    known: HashSet<&'static str>,
}

impl Default for ManifestPreloader {
    fn default() -> Self {
        Self {
            known: ASSET_MANIFEST.iter().copied().collect(),
        }
    }
}

impl AssetPreloader for ManifestPreloader {
    fn preload(&mut self, asset_key: &str) -> Result<(), String> {
        if self.known.contains(asset_key) {
            Ok(())
        } else {
            Err(format!("'{asset_key}' is not in the asset manifest"))
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct LoggingTransitionUi;

impl TransitionUi for LoggingTransitionUi {
    fn transition_started(&mut self, from: Option<&SceneKey>, to: &SceneKey) {
        info!(from = ?from.map(SceneKey::as_str), to = %to, "loading_screen_shown");
    }

    fn transition_finished(&mut self, outcome: &Result<TransitionReport, TransitionError>) {
        match outcome {
            Ok(report) => {
                for failure in &report.preload_failures {
                    warn!(
                        asset_key = failure.asset_key.as_str(),
                        reason = failure.reason.as_str(),
                        "asset_preload_failed"
                    );
                }
                info!(
                    to = %report.to,
                    entities_cleaned = report.entities_cleaned,
                    "loading_screen_hidden"
                );
            }
            Err(error) => warn!(error = %error, "scene_transition_failed"),
        }
    }
}
