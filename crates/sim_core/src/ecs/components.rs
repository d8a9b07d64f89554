use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::app::SceneKey;
use crate::persistence::ConfigDef;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn as_vec2(self) -> Vec2 {
        Vec2 {
            x: self.x,
            y: self.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0
    }
}

/// Marks an entity as owned by a scene; untagged entities survive transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneScope(pub SceneKey);

/// Presentation binding for an entity. `last_sent_position` is a runtime
/// cache of the last position pushed to the view and is never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpriteView {
    pub asset_key: String,
    pub last_sent_position: Option<Vec2>,
}

impl SpriteView {
    pub fn new(asset_key: impl Into<String>) -> Self {
        Self {
            asset_key: asset_key.into(),
            last_sent_position: None,
        }
    }
}

/// Entity has no presentation view yet; the view spawn system consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeedsView;

/// Progression data backed by a shared config definition. The definition is
/// load-time configuration, so snapshots store only its `(kind, id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterStats {
    pub config: Arc<ConfigDef>,
    pub level: u32,
    pub experience: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationState {
    pub current: Option<String>,
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationRequest {
    pub animation: String,
    pub looping: bool,
}

/// Gameplay-side declaration that an animation should play. Many systems may
/// write it; only the intent translation system reads and clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationIntent {
    pending: Option<AnimationRequest>,
}

impl AnimationIntent {
    pub fn request(&mut self, animation: impl Into<String>, looping: bool) {
        self.pending = Some(AnimationRequest {
            animation: animation.into(),
            looping,
        });
    }

    pub fn pending(&self) -> Option<&AnimationRequest> {
        self.pending.as_ref()
    }

    pub(crate) fn take(&mut self) -> Option<AnimationRequest> {
        self.pending.take()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoundIntent {
    pending: Option<String>,
}

impl SoundIntent {
    pub fn request(&mut self, sound: impl Into<String>) {
        self.pending = Some(sound.into());
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub(crate) fn take(&mut self) -> Option<String> {
        self.pending.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectAnchor {
    /// Follows the entity's view.
    Entity,
    /// Spawned once at the entity's current position.
    Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectRequest {
    pub effect: String,
    pub anchor: EffectAnchor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectIntent {
    pending: Option<EffectRequest>,
}

impl EffectIntent {
    pub fn request(&mut self, effect: impl Into<String>, anchor: EffectAnchor) {
        self.pending = Some(EffectRequest {
            effect: effect.into(),
            anchor,
        });
    }

    pub fn pending(&self) -> Option<&EffectRequest> {
        self.pending.as_ref()
    }

    pub(crate) fn take(&mut self) -> Option<EffectRequest> {
        self.pending.take()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dying {
    pub terminal_animation: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeathCountdown {
    pub remaining_seconds: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_take_clears_pending_request() {
        let mut intent = AnimationIntent::default();
        intent.request("attack", false);
        intent.request("hit", false);

        let taken = intent.take().expect("request");
        assert_eq!(taken.animation, "hit");
        assert!(intent.pending().is_none());
        assert!(intent.take().is_none());
    }

    #[test]
    fn health_depletes_at_zero() {
        let mut health = Health::new(5);
        assert!(!health.is_depleted());
        health.current = 0;
        assert!(health.is_depleted());
    }
}
