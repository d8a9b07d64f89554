use std::any::TypeId;

use tracing::warn;

use crate::bridge::{CommandBuffer, EventBus};
use crate::ecs::World;

/// Highest priority in the fixed (gameplay) band.
pub const FIXED_PRIORITY_MAX: i32 = 99;
/// Lowest priority in the render (presentation sync) band.
pub const RENDER_PRIORITY_MIN: i32 = 100;

pub struct SystemContext<'a> {
    pub world: &'a mut World,
    pub commands: &'a mut CommandBuffer,
    pub events: &'a mut EventBus,
    pub dt_seconds: f32,
}

pub trait System: 'static {
    fn priority(&self) -> i32;

    fn update(&mut self, context: &mut SystemContext<'_>);

    fn name(&self) -> &'static str {
        short_system_name(std::any::type_name::<Self>())
    }
}

struct SystemEntry {
    type_id: TypeId,
    name: &'static str,
    priority: i32,
    insertion_seq: u64,
    enabled: bool,
    system: Box<dyn System>,
}

/// Systems kept sorted ascending by priority. Equal priorities keep their
/// insertion order. Sorting happens lazily on the first update after a
/// change.
#[derive(Default)]
pub struct SortedSystemList {
    entries: Vec<SystemEntry>,
    dirty: bool,
    next_insertion_seq: u64,
    last_run_order: Vec<&'static str>,
}

impl SortedSystemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `system`. A second system of the same type is rejected.
    pub fn add<S: System>(&mut self, system: S) -> bool {
        let type_id = TypeId::of::<S>();
        if self.entries.iter().any(|entry| entry.type_id == type_id) {
            warn!(system = system.name(), "system_already_registered");
            return false;
        }
        self.entries.push(SystemEntry {
            type_id,
            name: system.name(),
            priority: system.priority(),
            insertion_seq: self.next_insertion_seq,
            enabled: true,
            system: Box::new(system),
        });
        self.next_insertion_seq = self.next_insertion_seq.saturating_add(1);
        self.dirty = true;
        true
    }

    pub fn remove<S: System>(&mut self) -> bool {
        let type_id = TypeId::of::<S>();
        let before = self.entries.len();
        self.entries.retain(|entry| entry.type_id != type_id);
        let removed = self.entries.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn contains<S: System>(&self) -> bool {
        self.entry::<S>().is_some()
    }

    pub fn set_enabled<S: System>(&mut self, enabled: bool) -> bool {
        match self.entry_mut::<S>() {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled<S: System>(&self) -> Option<bool> {
        self.entry::<S>().map(|entry| entry.enabled)
    }

    pub fn set_priority<S: System>(&mut self, priority: i32) -> bool {
        let Some(entry) = self.entry_mut::<S>() else {
            return false;
        };
        if entry.priority != priority {
            entry.priority = priority;
            self.dirty = true;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn update(&mut self, context: &mut SystemContext<'_>) {
        if self.dirty {
            // Stable sort; the sequence key makes the tie-break explicit.
            self.entries
                .sort_by_key(|entry| (entry.priority, entry.insertion_seq));
            self.dirty = false;
        }

        self.last_run_order.clear();
        for entry in self.entries.iter_mut().filter(|entry| entry.enabled) {
            self.last_run_order.push(entry.name);
            entry.system.update(context);
        }
    }

    /// Names of the systems executed by the most recent update.
    pub fn last_run_order(&self) -> &[&'static str] {
        &self.last_run_order
    }

    pub fn system_order(&self) -> String {
        self.last_run_order.join(">")
    }

    fn entry<S: System>(&self) -> Option<&SystemEntry> {
        let type_id = TypeId::of::<S>();
        self.entries.iter().find(|entry| entry.type_id == type_id)
    }

    fn entry_mut<S: System>(&mut self) -> Option<&mut SystemEntry> {
        let type_id = TypeId::of::<S>();
        self.entries.iter_mut().find(|entry| entry.type_id == type_id)
    }
}

fn short_system_name(full: &'static str) -> &'static str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
