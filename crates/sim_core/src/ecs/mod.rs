mod components;
mod handle;
mod world;

pub use components::{
    AnimationIntent, AnimationRequest, AnimationState, CharacterStats, DeathCountdown, Dying,
    EffectAnchor, EffectIntent, EffectRequest, Health, Name, NeedsView, Position, SceneScope,
    SoundIntent, SpriteView, Vec2,
};
pub use handle::{EntityId, EntityIdAllocator, Handle, HandleRegistry};
pub use world::World;
