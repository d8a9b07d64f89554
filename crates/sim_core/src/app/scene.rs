use std::fmt;

use thiserror::Error;

use crate::bridge::CommandBuffer;
use crate::ecs::{Handle, NeedsView, Position, SceneScope, SpriteView, World};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneKey(String);

impl SceneKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SceneError {
    message: String,
}

impl SceneError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What a scene hook may touch. Entities spawned through it are tagged with
/// the scene's [`SceneScope`] and disappear on the next transition away.
pub struct SceneContext<'a> {
    pub world: &'a mut World,
    pub commands: &'a mut CommandBuffer,
    scene: &'a SceneKey,
}

impl<'a> SceneContext<'a> {
    pub fn new(world: &'a mut World, commands: &'a mut CommandBuffer, scene: &'a SceneKey) -> Self {
        Self {
            world,
            commands,
            scene,
        }
    }

    pub fn scene(&self) -> &SceneKey {
        self.scene
    }

    pub fn spawn_scoped(&mut self) -> Handle {
        let handle = self.world.create();
        let _ = self.world.insert(handle, SceneScope(self.scene.clone()));
        handle
    }

    /// Scoped entity with a sprite that still needs its presentation view.
    pub fn spawn_scoped_sprite(&mut self, asset_key: &str, position: Position) -> Handle {
        let handle = self.spawn_scoped();
        let _ = self.world.insert(handle, position);
        let _ = self.world.insert(handle, SpriteView::new(asset_key));
        let _ = self.world.insert(handle, NeedsView);
        handle
    }
}

pub trait SceneModule {
    /// Asset keys handed to the preloader before the scene is entered.
    fn preload_assets(&self) -> Vec<String> {
        Vec::new()
    }

    fn preload(&mut self, _context: &mut SceneContext<'_>) -> Result<(), SceneError> {
        Ok(())
    }

    fn enter(&mut self, context: &mut SceneContext<'_>) -> Result<(), SceneError>;

    fn exit(&mut self, _context: &mut SceneContext<'_>) -> Result<(), SceneError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_entities_carry_scene_scope() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let key = SceneKey::new("dungeon");
        let mut context = SceneContext::new(&mut world, &mut commands, &key);

        let bat = context.spawn_scoped_sprite("sprite/bat", Position { x: 1.0, y: 2.0 });

        assert_eq!(world.get::<SceneScope>(bat), Some(&SceneScope(key.clone())));
        assert!(world.has::<NeedsView>(bat));
        assert_eq!(key.to_string(), "dungeon");
    }
}
