use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::components::Name;
use super::handle::{EntityId, Handle, HandleRegistry};

trait ErasedStore {
    fn remove_slot(&mut self, index: u32);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense per-type column indexed by slot. Validity is checked against the
/// registry before any access, so a stale handle never reads a reused slot.
struct ComponentStore<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T: 'static> ComponentStore<T> {
    fn insert(&mut self, index: u32, value: T) -> Option<T> {
        let index = index as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].replace(value)
    }

    fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    fn take(&mut self, index: u32) -> Option<T> {
        self.slots.get_mut(index as usize).and_then(Option::take)
    }

    fn occupied_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index as u32)
    }
}

impl<T: 'static> ErasedStore for ComponentStore<T> {
    fn remove_slot(&mut self, index: u32) {
        self.take(index);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entities plus their components. Systems query by component type and
/// always address entities through [`Handle`]s.
#[derive(Default)]
pub struct World {
    registry: HandleRegistry,
    stores: HashMap<TypeId, Box<dyn ErasedStore>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty world meant to replace `self`. Handles issued by `self` are
    /// never valid in it, so anything still queued for the old world reads
    /// as stale instead of aliasing a new entity.
    pub fn successor(&self) -> Self {
        Self {
            registry: self.registry.successor(),
            stores: HashMap::new(),
        }
    }

    pub fn create(&mut self) -> Handle {
        self.registry.create()
    }

    pub fn create_named(&mut self, name: impl Into<String>) -> Handle {
        let handle = self.registry.create();
        let _ = self.insert(handle, Name(name.into()));
        handle
    }

    /// Removes every component of the entity and frees its slot. Stale
    /// handles are ignored and report `false`.
    pub fn destroy(&mut self, handle: Handle) -> bool {
        if !self.registry.is_valid(handle) {
            return false;
        }
        for store in self.stores.values_mut() {
            store.remove_slot(handle.index());
        }
        self.registry.destroy(handle)
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.registry.is_valid(handle)
    }

    pub fn resolve(&self, handle: Handle) -> Option<EntityId> {
        self.registry.resolve(handle)
    }

    pub fn entity_count(&self) -> usize {
        self.registry.alive_count()
    }

    pub fn entities(&self) -> Vec<Handle> {
        self.registry.iter_alive().collect()
    }

    /// Attaches `component`, returning the value it replaced. Returns the
    /// component back untouched when the handle is stale.
    pub fn insert<T: 'static>(&mut self, handle: Handle, component: T) -> Result<Option<T>, T> {
        if !self.registry.is_valid(handle) {
            return Err(component);
        }
        Ok(self.store_mut::<T>().insert(handle.index(), component))
    }

    pub fn remove<T: 'static>(&mut self, handle: Handle) -> Option<T> {
        if !self.registry.is_valid(handle) {
            return None;
        }
        self.existing_store_mut::<T>()?.take(handle.index())
    }

    pub fn get<T: 'static>(&self, handle: Handle) -> Option<&T> {
        if !self.registry.is_valid(handle) {
            return None;
        }
        self.store::<T>()?.get(handle.index())
    }

    pub fn get_mut<T: 'static>(&mut self, handle: Handle) -> Option<&mut T> {
        if !self.registry.is_valid(handle) {
            return None;
        }
        self.existing_store_mut::<T>()?.get_mut(handle.index())
    }

    pub fn has<T: 'static>(&self, handle: Handle) -> bool {
        self.get::<T>(handle).is_some()
    }

    /// Handles of every live entity carrying `T`, in ascending slot order.
    pub fn query<T: 'static>(&self) -> Vec<Handle> {
        let Some(store) = self.store::<T>() else {
            return Vec::new();
        };
        store
            .occupied_indices()
            .filter_map(|index| self.registry.handle_at(index))
            .collect()
    }

    pub fn query2<A: 'static, B: 'static>(&self) -> Vec<Handle> {
        self.query::<A>()
            .into_iter()
            .filter(|handle| self.has::<B>(*handle))
            .collect()
    }

    pub fn name(&self, handle: Handle) -> Option<&str> {
        self.get::<Name>(handle).map(|name| name.0.as_str())
    }

    pub fn find_by_name(&self, name: &str) -> Option<Handle> {
        self.query::<Name>()
            .into_iter()
            .find(|handle| self.name(*handle) == Some(name))
    }

    fn store<T: 'static>(&self) -> Option<&ComponentStore<T>> {
        self.stores
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<ComponentStore<T>>()
    }

    fn existing_store_mut<T: 'static>(&mut self) -> Option<&mut ComponentStore<T>> {
        self.stores
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<ComponentStore<T>>()
    }

    fn store_mut<T: 'static>(&mut self) -> &mut ComponentStore<T> {
        let store = self
            .stores
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentStore::<T>::default()));
        match store.as_any_mut().downcast_mut::<ComponentStore<T>>() {
            Some(store) => store,
            None => unreachable!("component store keyed by TypeId holds a different type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::{Health, Position};

    #[test]
    fn components_round_trip_through_handles() {
        let mut world = World::new();
        let handle = world.create();
        world
            .insert(handle, Position { x: 1.0, y: 2.0 })
            .expect("insert");

        assert_eq!(world.get::<Position>(handle), Some(&Position { x: 1.0, y: 2.0 }));
        world.get_mut::<Position>(handle).expect("position").x = 5.0;
        assert_eq!(world.get::<Position>(handle).map(|p| p.x), Some(5.0));
    }

    #[test]
    fn destroy_clears_components_before_slot_reuse() {
        let mut world = World::new();
        let old = world.create();
        world.insert(old, Health::new(10)).expect("insert");
        assert!(world.destroy(old));

        let reused = world.create();
        assert_eq!(reused.index(), old.index());
        assert!(!world.has::<Health>(reused));
        assert!(world.get::<Health>(old).is_none());
    }

    #[test]
    fn insert_on_stale_handle_hands_component_back() {
        let mut world = World::new();
        let handle = world.create();
        world.destroy(handle);

        let rejected = world.insert(handle, Position::default());
        assert_eq!(rejected, Err(Position::default()));
    }

    #[test]
    fn query2_requires_both_components() {
        let mut world = World::new();
        let both = world.create();
        let only_position = world.create();
        world.insert(both, Position::default()).expect("insert");
        world.insert(both, Health::new(3)).expect("insert");
        world
            .insert(only_position, Position::default())
            .expect("insert");

        assert_eq!(world.query::<Position>(), vec![both, only_position]);
        assert_eq!(world.query2::<Position, Health>(), vec![both]);
    }

    #[test]
    fn find_by_name_ignores_destroyed_entities() {
        let mut world = World::new();
        let first = world.create_named("Player");
        world.destroy(first);
        assert_eq!(world.find_by_name("Player"), None);

        let second = world.create_named("Player");
        assert_eq!(world.find_by_name("Player"), Some(second));
        assert_eq!(world.name(second), Some("Player"));
    }

    #[test]
    fn double_destroy_is_harmless() {
        let mut world = World::new();
        let handle = world.create();
        assert!(world.destroy(handle));
        assert!(!world.destroy(handle));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn successor_world_starts_empty_and_rejects_old_handles() {
        let mut world = World::new();
        let player = world.create_named("Player");
        world.insert(player, Health::new(5)).expect("insert");

        let mut next = world.successor();
        assert_eq!(next.entity_count(), 0);
        assert!(next.find_by_name("Player").is_none());

        let restored = next.create_named("Player");
        assert_eq!(restored.index(), player.index());
        assert!(!next.is_valid(player));
        assert!(next.get::<Health>(player).is_none());
        assert!(next.insert(player, Health::new(1)).is_err());
        assert_eq!(next.find_by_name("Player"), Some(restored));
    }
}
