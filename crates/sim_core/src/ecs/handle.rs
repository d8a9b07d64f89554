use std::fmt;

use tracing::debug;

/// Reference to an entity that stays safe across frames and async gaps.
///
/// `index` names a reusable storage slot; `generation` is bumped every time
/// that slot is freed, so a handle kept past its entity's destruction can
/// never alias whatever reuses the slot later.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Default, Clone)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    occupant: Option<EntityId>,
    /// Generation space is exhausted; the slot is never handed out again.
    retired: bool,
}

#[derive(Debug, Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    ids: EntityIdAllocator,
    alive: usize,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Handle {
        let id = self.ids.allocate();
        self.alive = self.alive.saturating_add(1);
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.occupant = Some(id);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            occupant: Some(id),
            retired: false,
        });
        Handle {
            index,
            generation: 0,
        }
    }

    /// Frees the slot and bumps its generation. Returns `false` for handles
    /// that were already stale; that is an expected outcome, not a fault.
    pub fn destroy(&mut self, handle: Handle) -> bool {
        if !self.is_valid(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.occupant = None;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free_list.push(handle.index);
            }
            None => {
                slot.retired = true;
                debug!(index = handle.index, "handle_slot_retired");
            }
        }
        self.alive = self.alive.saturating_sub(1);
        true
    }

    /// Empty registry for a world that replaces this one. Every slot starts
    /// past the generations handed out here, so no handle issued by this
    /// registry is valid in the successor.
    pub fn successor(&self) -> Self {
        let mut slots = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let generation = match (slot.retired, slot.occupant) {
                (true, _) => None,
                (false, Some(_)) => slot.generation.checked_add(1),
                // Free slots were already bumped when their occupant died.
                (false, None) => Some(slot.generation),
            };
            slots.push(Slot {
                generation: generation.unwrap_or(u32::MAX),
                occupant: None,
                retired: generation.is_none(),
            });
        }
        // Reversed so the lowest free index is reused first.
        let free_list = (0..slots.len() as u32)
            .rev()
            .filter(|index| !slots[*index as usize].retired)
            .collect();
        Self {
            slots,
            free_list,
            ids: self.ids.clone(),
            alive: 0,
        }
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.occupant.is_some() && slot.generation == handle.generation)
    }

    pub fn resolve(&self, handle: Handle) -> Option<EntityId> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.occupant
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Live handles in ascending slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupant.is_some())
            .map(|(index, slot)| Handle {
                index: index as u32,
                generation: slot.generation,
            })
    }

    pub(crate) fn handle_at(&self, index: u32) -> Option<Handle> {
        let slot = self.slots.get(index as usize)?;
        slot.occupant?;
        Some(Handle {
            index,
            generation: slot.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handles_use_sequential_slots() {
        let mut registry = HandleRegistry::new();
        let first = registry.create();
        let second = registry.create();

        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(first.generation(), 0);
        assert!(registry.is_valid(first));
        assert!(registry.is_valid(second));
    }

    #[test]
    fn destroyed_handle_stays_invalid_after_slot_reuse() {
        let mut registry = HandleRegistry::new();
        let original = registry.create();
        assert!(registry.destroy(original));

        let reused = registry.create();
        assert_eq!(reused.index(), original.index());
        assert_eq!(reused.generation(), original.generation() + 1);
        assert!(!registry.is_valid(original));
        assert!(registry.is_valid(reused));
        assert_eq!(registry.resolve(original), None);
    }

    #[test]
    fn destroying_stale_handle_is_a_no_op() {
        let mut registry = HandleRegistry::new();
        let handle = registry.create();
        assert!(registry.destroy(handle));
        assert!(!registry.destroy(handle));
        assert_eq!(registry.alive_count(), 0);
        assert_eq!(registry.slot_count(), 1);
    }

    #[test]
    fn resolve_returns_distinct_identity_per_occupant() {
        let mut registry = HandleRegistry::new();
        let first = registry.create();
        let first_id = registry.resolve(first).expect("first id");
        registry.destroy(first);
        let second = registry.create();
        let second_id = registry.resolve(second).expect("second id");

        assert_ne!(first_id, second_id);
    }

    #[test]
    fn out_of_range_handle_is_invalid() {
        let registry = HandleRegistry::new();
        let bogus = Handle::from_raw_parts(42, 0);
        assert!(!registry.is_valid(bogus));
        assert_eq!(registry.resolve(bogus), None);
    }

    #[test]
    fn iter_alive_skips_freed_slots() {
        let mut registry = HandleRegistry::new();
        let a = registry.create();
        let b = registry.create();
        let c = registry.create();
        registry.destroy(b);

        let alive: Vec<Handle> = registry.iter_alive().collect();
        assert_eq!(alive, vec![a, c]);
    }

    #[test]
    fn exhausted_slot_is_retired_instead_of_wrapping() {
        let mut registry = HandleRegistry::new();
        let old = registry.create();
        registry.slots[0].generation = u32::MAX;
        let last = Handle::from_raw_parts(0, u32::MAX);

        assert!(registry.destroy(last));
        let next = registry.create();

        assert_eq!(next.index(), 1);
        assert!(!registry.is_valid(last));
        assert!(!registry.is_valid(old));
        assert!(registry.slots[0].retired);
    }

    #[test]
    fn successor_invalidates_every_handle_issued_before() {
        let mut registry = HandleRegistry::new();
        let kept = registry.create();
        let freed = registry.create();
        let stale_id = registry.resolve(kept).expect("id");
        registry.destroy(freed);

        let mut next = registry.successor();
        assert_eq!(next.alive_count(), 0);
        assert!(!next.is_valid(kept));
        assert!(!next.is_valid(freed));

        let first = next.create();
        let second = next.create();
        assert_eq!(first.index(), 0);
        assert_eq!(first.generation(), kept.generation() + 1);
        assert_eq!(second.index(), 1);
        assert_eq!(second.generation(), freed.generation() + 1);
        assert!(!next.is_valid(kept));
        assert!(!next.is_valid(freed));
        assert_ne!(next.resolve(first), Some(stale_id));
    }

    #[test]
    fn successor_keeps_retired_slots_out_of_use() {
        let mut registry = HandleRegistry::new();
        let exhausted = registry.create();
        registry.slots[0].generation = u32::MAX;
        let exhausted = Handle::from_raw_parts(exhausted.index(), u32::MAX);

        let mut next = registry.successor();
        let fresh = next.create();

        assert_eq!(fresh.index(), 1);
        assert!(!next.is_valid(exhausted));
    }
}
