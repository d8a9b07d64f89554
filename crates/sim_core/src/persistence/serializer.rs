use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::ecs::{CharacterStats, Handle, Health, Name, Position, SpriteView, World};

use super::config::ConfigLookup;
use super::snapshot::{ComponentRecord, EntityRecord, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationPolicy {
    /// Every field is data.
    Full,
    /// Runtime-only fields are dropped on save and reset on load.
    Partial,
    /// Pointers into load-time config are saved as `(kind, id)` and
    /// re-resolved through a [`ConfigLookup`].
    ReferenceFiltered,
}

pub trait ComponentSerializer: 'static {
    type Component: 'static;

    const TYPE_NAME: &'static str;
    const POLICY: SerializationPolicy;

    fn serialize(component: &Self::Component) -> Result<Value, SnapshotError>;

    fn deserialize(
        data: Value,
        lookup: Option<&dyn ConfigLookup>,
    ) -> Result<Self::Component, SnapshotError>;
}

fn encode<T: Serialize>(value: &T) -> Result<Value, SnapshotError> {
    serde_json::to_value(value).map_err(SnapshotError::Encode)
}

fn decode<T: for<'de> Deserialize<'de>>(
    type_name: &'static str,
    data: Value,
) -> Result<T, SnapshotError> {
    serde_json::from_value(data).map_err(|source| SnapshotError::Decode { type_name, source })
}

pub struct NameSerializer;

impl ComponentSerializer for NameSerializer {
    type Component = Name;

    const TYPE_NAME: &'static str = "Name";
    const POLICY: SerializationPolicy = SerializationPolicy::Full;

    fn serialize(component: &Name) -> Result<Value, SnapshotError> {
        Ok(Value::String(component.0.clone()))
    }

    fn deserialize(data: Value, _lookup: Option<&dyn ConfigLookup>) -> Result<Name, SnapshotError> {
        decode(Self::TYPE_NAME, data).map(Name)
    }
}

pub struct PositionSerializer;

impl ComponentSerializer for PositionSerializer {
    type Component = Position;

    const TYPE_NAME: &'static str = "Position";
    const POLICY: SerializationPolicy = SerializationPolicy::Full;

    fn serialize(component: &Position) -> Result<Value, SnapshotError> {
        encode(component)
    }

    fn deserialize(
        data: Value,
        _lookup: Option<&dyn ConfigLookup>,
    ) -> Result<Position, SnapshotError> {
        decode(Self::TYPE_NAME, data)
    }
}

pub struct HealthSerializer;

impl ComponentSerializer for HealthSerializer {
    type Component = Health;

    const TYPE_NAME: &'static str = "Health";
    const POLICY: SerializationPolicy = SerializationPolicy::Full;

    fn serialize(component: &Health) -> Result<Value, SnapshotError> {
        encode(component)
    }

    fn deserialize(data: Value, _lookup: Option<&dyn ConfigLookup>) -> Result<Health, SnapshotError> {
        decode(Self::TYPE_NAME, data)
    }
}

#[derive(Serialize, Deserialize)]
struct SavedSpriteView {
    asset_key: String,
}

/// Saves the asset key only; the last-sent position cache starts empty.
pub struct SpriteViewSerializer;

impl ComponentSerializer for SpriteViewSerializer {
    type Component = SpriteView;

    const TYPE_NAME: &'static str = "SpriteView";
    const POLICY: SerializationPolicy = SerializationPolicy::Partial;

    fn serialize(component: &SpriteView) -> Result<Value, SnapshotError> {
        encode(&SavedSpriteView {
            asset_key: component.asset_key.clone(),
        })
    }

    fn deserialize(
        data: Value,
        _lookup: Option<&dyn ConfigLookup>,
    ) -> Result<SpriteView, SnapshotError> {
        let saved: SavedSpriteView = decode(Self::TYPE_NAME, data)?;
        Ok(SpriteView::new(saved.asset_key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRef {
    pub kind: String,
    pub id: String,
}

#[derive(Serialize, Deserialize)]
struct SavedCharacterStats {
    config: ConfigRef,
    level: u32,
    experience: u64,
}

pub struct CharacterStatsSerializer;

impl ComponentSerializer for CharacterStatsSerializer {
    type Component = CharacterStats;

    const TYPE_NAME: &'static str = "CharacterStats";
    const POLICY: SerializationPolicy = SerializationPolicy::ReferenceFiltered;

    fn serialize(component: &CharacterStats) -> Result<Value, SnapshotError> {
        encode(&SavedCharacterStats {
            config: ConfigRef {
                kind: component.config.kind.clone(),
                id: component.config.def_name.clone(),
            },
            level: component.level,
            experience: component.experience,
        })
    }

    fn deserialize(
        data: Value,
        lookup: Option<&dyn ConfigLookup>,
    ) -> Result<CharacterStats, SnapshotError> {
        let lookup = lookup.ok_or(SnapshotError::MissingConfigLookup {
            type_name: Self::TYPE_NAME,
        })?;
        let saved: SavedCharacterStats = decode(Self::TYPE_NAME, data)?;
        let config = lookup
            .component_config(&saved.config.kind, &saved.config.id)
            .ok_or_else(|| SnapshotError::UnresolvedReference {
                kind: saved.config.kind.clone(),
                id: saved.config.id.clone(),
            })?;
        Ok(CharacterStats {
            config,
            level: saved.level,
            experience: saved.experience,
        })
    }
}

trait ErasedSerializer {
    fn type_name(&self) -> &'static str;

    fn policy(&self) -> SerializationPolicy;

    fn capture(&self, world: &World, handle: Handle) -> Result<Option<Value>, SnapshotError>;

    fn restore(
        &self,
        world: &mut World,
        handle: Handle,
        data: Value,
        lookup: Option<&dyn ConfigLookup>,
    ) -> Result<(), SnapshotError>;
}

struct Erased<S>(PhantomData<fn() -> S>);

impl<S: ComponentSerializer> ErasedSerializer for Erased<S> {
    fn type_name(&self) -> &'static str {
        S::TYPE_NAME
    }

    fn policy(&self) -> SerializationPolicy {
        S::POLICY
    }

    fn capture(&self, world: &World, handle: Handle) -> Result<Option<Value>, SnapshotError> {
        world
            .get::<S::Component>(handle)
            .map(S::serialize)
            .transpose()
    }

    fn restore(
        &self,
        world: &mut World,
        handle: Handle,
        data: Value,
        lookup: Option<&dyn ConfigLookup>,
    ) -> Result<(), SnapshotError> {
        let component = S::deserialize(data, lookup)?;
        if world.insert(handle, component).is_err() {
            warn!(entity = ?handle, component = S::TYPE_NAME, "restore_target_stale");
        }
        Ok(())
    }
}

/// The whitelist: only component types registered here are ever saved.
/// Components are written and restored in registration order.
#[derive(Default)]
pub struct SerializerRegistry {
    entries: Vec<Box<dyn ErasedSerializer>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<NameSerializer>();
        registry.register::<PositionSerializer>();
        registry.register::<HealthSerializer>();
        registry.register::<SpriteViewSerializer>();
        registry.register::<CharacterStatsSerializer>();
        registry
    }

    /// Rejects a second serializer under an existing type name.
    pub fn register<S: ComponentSerializer>(&mut self) -> bool {
        if self.contains(S::TYPE_NAME) {
            warn!(component = S::TYPE_NAME, "serializer_already_registered");
            return false;
        }
        self.entries.push(Box::new(Erased::<S>(PhantomData)));
        true
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.type_name() == type_name)
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.type_name()).collect()
    }

    pub fn policy_of(&self, type_name: &str) -> Option<SerializationPolicy> {
        self.entries
            .iter()
            .find(|entry| entry.type_name() == type_name)
            .map(|entry| entry.policy())
    }

    pub fn capture_entity(&self, world: &World, handle: Handle) -> Result<EntityRecord, SnapshotError> {
        let mut components = Vec::new();
        for entry in &self.entries {
            if let Some(data) = entry.capture(world, handle)? {
                components.push(ComponentRecord {
                    type_name: entry.type_name().to_string(),
                    data,
                });
            }
        }
        Ok(EntityRecord { components })
    }

    pub fn restore_component(
        &self,
        world: &mut World,
        handle: Handle,
        record: ComponentRecord,
        lookup: Option<&dyn ConfigLookup>,
    ) -> Result<(), SnapshotError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.type_name() == record.type_name)
            .ok_or(SnapshotError::UnknownComponent(record.type_name))?;
        entry.restore(world, handle, record.data, lookup)
    }
}
