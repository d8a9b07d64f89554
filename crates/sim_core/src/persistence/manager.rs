use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::ecs::{CharacterStats, Handle, Health, NeedsView, SpriteView, World};

use super::config::ConfigLookup;
use super::serializer::SerializerRegistry;
use super::snapshot::{slot_key, Snapshot, SnapshotError, SLOT_COUNT};
use super::store::SaveStore;

pub const PLAYER_NAME: &str = "Player";

/// Chooses the entity a save is built around.
pub trait PlayerLocator {
    fn locate(&self, world: &World) -> Option<Handle>;
}

/// The entity named [`PLAYER_NAME`], else the first entity carrying both
/// [`CharacterStats`] and [`Health`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlayerLocator;

impl PlayerLocator for DefaultPlayerLocator {
    fn locate(&self, world: &World) -> Option<Handle> {
        world.find_by_name(PLAYER_NAME).or_else(|| {
            world
                .query2::<CharacterStats, Health>()
                .into_iter()
                .next()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveInfo {
    pub slot: u32,
    pub version: u32,
    pub timestamp_ms: u64,
    pub entity_count: usize,
    pub player_name: Option<String>,
}

/// A freshly built world from a snapshot. It replaces the caller's world;
/// nothing in it shares handles with the world that was saved.
pub struct LoadedWorld {
    pub world: World,
    pub player: Option<Handle>,
    pub entities: Vec<Handle>,
}

type Clock = Box<dyn Fn() -> u64>;

pub struct SaveManager {
    store: Box<dyn SaveStore>,
    registry: SerializerRegistry,
    lookup: Option<Arc<dyn ConfigLookup>>,
    locator: Box<dyn PlayerLocator>,
    clock: Clock,
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

impl SaveManager {
    pub fn new(store: Box<dyn SaveStore>) -> Self {
        Self {
            store,
            registry: SerializerRegistry::with_builtin(),
            lookup: None,
            locator: Box::new(DefaultPlayerLocator),
            clock: Box::new(wall_clock_ms),
        }
    }

    pub fn with_registry(mut self, registry: SerializerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config_lookup(mut self, lookup: Arc<dyn ConfigLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_player_locator(mut self, locator: Box<dyn PlayerLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> u64 + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn set_config_lookup(&mut self, lookup: Arc<dyn ConfigLookup>) {
        self.lookup = Some(lookup);
    }

    pub fn registry(&self) -> &SerializerRegistry {
        &self.registry
    }

    /// Serializes the player's whitelisted components into `slot`.
    pub fn save(&mut self, slot: u32, world: &World) -> Result<SaveInfo, SnapshotError> {
        let key = slot_key(slot)?;
        let player = self.locator.locate(world).ok_or(SnapshotError::NoPlayer)?;
        let record = self.registry.capture_entity(world, player)?;
        let snapshot = Snapshot::new((self.clock)(), vec![record]);
        let json = snapshot.to_json()?;
        self.store
            .write(&key, &json)
            .map_err(|source| SnapshotError::Storage {
                key: key.clone(),
                source,
            })?;

        let info = summarize(slot, &snapshot);
        info!(
            slot,
            entity_count = info.entity_count,
            bytes = json.len(),
            "snapshot_saved"
        );
        Ok(info)
    }

    /// Rebuilds a brand-new world from `slot` to take the place of
    /// `replacing`. The new world starts past every generation `replacing`
    /// issued, so handles still held for the old world stay stale. Any
    /// failure, including a version mismatch, leaves no partially built
    /// world behind.
    pub fn load(&self, slot: u32, replacing: &World) -> Result<LoadedWorld, SnapshotError> {
        let raw = self.read_slot(slot)?;
        let snapshot = Snapshot::from_json_strict(&raw)?;

        let mut world = replacing.successor();
        let mut entities = Vec::with_capacity(snapshot.entities.len());
        for record in snapshot.entities {
            let handle = world.create();
            for component in record.components {
                self.registry.restore_component(
                    &mut world,
                    handle,
                    component,
                    self.lookup.as_deref(),
                )?;
            }
            if world.has::<SpriteView>(handle) {
                let _ = world.insert(handle, NeedsView);
            }
            entities.push(handle);
        }

        let player = self.locator.locate(&world);
        info!(
            slot,
            entity_count = entities.len(),
            player_found = player.is_some(),
            "snapshot_loaded"
        );
        Ok(LoadedWorld {
            world,
            player,
            entities,
        })
    }

    pub fn delete(&mut self, slot: u32) -> Result<bool, SnapshotError> {
        let key = slot_key(slot)?;
        let removed = self
            .store
            .remove(&key)
            .map_err(|source| SnapshotError::Storage {
                key: key.clone(),
                source,
            })?;
        debug!(slot, removed, "snapshot_deleted");
        Ok(removed)
    }

    pub fn has(&self, slot: u32) -> Result<bool, SnapshotError> {
        let key = slot_key(slot)?;
        self.store
            .contains(&key)
            .map_err(|source| SnapshotError::Storage { key, source })
    }

    /// Metadata for `slot`. Reports the stored version as-is so callers can
    /// flag saves that `load` would reject.
    pub fn get_info(&self, slot: u32) -> Result<Option<SaveInfo>, SnapshotError> {
        let key = slot_key(slot)?;
        let raw = self
            .store
            .read(&key)
            .map_err(|source| SnapshotError::Storage { key, source })?;
        match raw {
            Some(raw) => Ok(Some(summarize(slot, &Snapshot::from_json(&raw)?))),
            None => Ok(None),
        }
    }

    pub fn list_slots(&self) -> Result<Vec<u32>, SnapshotError> {
        let mut occupied = Vec::new();
        for slot in 0..SLOT_COUNT {
            if self.has(slot)? {
                occupied.push(slot);
            }
        }
        Ok(occupied)
    }

    fn read_slot(&self, slot: u32) -> Result<String, SnapshotError> {
        let key = slot_key(slot)?;
        self.store
            .read(&key)
            .map_err(|source| SnapshotError::Storage { key, source })?
            .ok_or(SnapshotError::NotFound { slot })
    }
}

fn summarize(slot: u32, snapshot: &Snapshot) -> SaveInfo {
    let player_name = snapshot
        .entities
        .first()
        .and_then(|record| record.component("Name"))
        .and_then(|value| value.as_str())
        .map(str::to_string);
    SaveInfo {
        slot,
        version: snapshot.version,
        timestamp_ms: snapshot.timestamp_ms,
        entity_count: snapshot.entities.len(),
        player_name,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::ecs::{AnimationState, Name, Position};
    use crate::persistence::config::{ConfigDatabase, ConfigDef};
    use crate::persistence::store::{FileSaveStore, MemorySaveStore};
    use crate::persistence::snapshot::SNAPSHOT_VERSION;

    fn config_database() -> Arc<ConfigDatabase> {
        Arc::new(ConfigDatabase::from_defs(vec![ConfigDef {
            kind: "character".to_string(),
            def_name: "knight".to_string(),
            label: "Knight".to_string(),
            move_speed: 3.5,
            health_max: Some(30),
            tags: Vec::new(),
        }]))
    }

    fn world_with_player(database: &ConfigDatabase) -> (World, Handle) {
        let mut world = World::new();
        let _decoy = world.create();
        let player = world.create_named(PLAYER_NAME);
        let _ = world.insert(player, Position { x: 12.5, y: -3.0 });
        let _ = world.insert(player, Health { current: 17, max: 30 });
        let _ = world.insert(player, SpriteView::new("sprite/knight"));
        let _ = world.insert(
            player,
            CharacterStats {
                config: Arc::clone(database.get("character", "knight").expect("knight")),
                level: 4,
                experience: 900,
            },
        );
        let _ = world.insert(player, AnimationState::default());
        (world, player)
    }

    fn manager(store: Box<dyn SaveStore>, database: Arc<ConfigDatabase>) -> SaveManager {
        SaveManager::new(store)
            .with_config_lookup(database)
            .with_clock(|| 1_700_000_000_000)
    }

    #[test]
    fn save_then_load_rebuilds_player_in_a_fresh_world() {
        let database = config_database();
        let (world, _) = world_with_player(&database);
        let mut manager = manager(Box::new(MemorySaveStore::new()), Arc::clone(&database));

        let info = manager.save(2, &world).expect("save");
        let loaded = manager.load(2, &world).expect("load");

        assert_eq!(
            info,
            SaveInfo {
                slot: 2,
                version: SNAPSHOT_VERSION,
                timestamp_ms: 1_700_000_000_000,
                entity_count: 1,
                player_name: Some(PLAYER_NAME.to_string()),
            }
        );
        let player = loaded.player.expect("player");
        assert_eq!(loaded.entities, vec![player]);
        assert_eq!(loaded.world.entity_count(), 1);
        assert_eq!(
            loaded.world.get::<Position>(player),
            Some(&Position { x: 12.5, y: -3.0 })
        );
        assert_eq!(
            loaded.world.get::<Health>(player),
            Some(&Health { current: 17, max: 30 })
        );
        let stats = loaded.world.get::<CharacterStats>(player).expect("stats");
        assert_eq!((stats.level, stats.experience), (4, 900));
        assert_eq!(stats.config.def_name, "knight");
        assert!(loaded.world.has::<NeedsView>(player));
        assert!(!loaded.world.has::<AnimationState>(player));
        assert_eq!(
            loaded
                .world
                .get::<SpriteView>(player)
                .and_then(|sprite| sprite.last_sent_position),
            None
        );
    }

    #[test]
    fn handles_from_the_replaced_world_are_stale_after_load() {
        let database = config_database();
        let (world, old_player) = world_with_player(&database);
        let mut manager = manager(Box::new(MemorySaveStore::new()), database);
        manager.save(3, &world).expect("save");

        let loaded = manager.load(3, &world).expect("load");
        let player = loaded.player.expect("player");

        assert_eq!(player.index(), old_player.index());
        assert_ne!(player, old_player);
        assert!(!loaded.world.is_valid(old_player));
        assert!(loaded.world.get::<Health>(old_player).is_none());
        assert_eq!(loaded.world.find_by_name(PLAYER_NAME), Some(player));
    }

    #[test]
    fn player_falls_back_to_stats_and_health() {
        let database = config_database();
        let (mut world, player) = world_with_player(&database);
        let _ = world.remove::<Name>(player);

        assert_eq!(DefaultPlayerLocator.locate(&world), Some(player));
        world.remove::<Health>(player);
        assert_eq!(DefaultPlayerLocator.locate(&world), None);

        let mut manager = manager(Box::new(MemorySaveStore::new()), database);
        assert!(matches!(
            manager.save(0, &world),
            Err(SnapshotError::NoPlayer)
        ));
        assert!(!manager.has(0).expect("has"));
    }

    #[test]
    fn version_mismatch_fails_load() {
        let mut store = MemorySaveStore::new();
        store
            .write(
                "save_1",
                &json!({ "version": SNAPSHOT_VERSION + 1, "timestamp_ms": 0, "entities": [] })
                    .to_string(),
            )
            .expect("write");
        let manager = manager(Box::new(store), config_database());

        assert!(matches!(
            manager.load(1, &World::new()),
            Err(SnapshotError::VersionMismatch { found, .. }) if found == SNAPSHOT_VERSION + 1
        ));
        let info = manager.get_info(1).expect("info").expect("present");
        assert_eq!(info.version, SNAPSHOT_VERSION + 1);
    }

    #[test]
    fn out_of_range_slots_are_rejected() {
        let mut manager = manager(Box::new(MemorySaveStore::new()), config_database());
        let world = World::new();

        assert!(matches!(
            manager.save(10, &world),
            Err(SnapshotError::InvalidSlot { slot: 10 })
        ));
        assert!(matches!(
            manager.load(42, &world),
            Err(SnapshotError::InvalidSlot { slot: 42 })
        ));
        assert!(manager.has(10).is_err());
        assert!(manager.delete(99).is_err());
        assert!(manager.get_info(10).is_err());
    }

    #[test]
    fn load_without_config_lookup_fails_for_reference_components() {
        let database = config_database();
        let (world, _) = world_with_player(&database);
        let mut saving = manager(Box::new(MemorySaveStore::new()), database);
        saving.save(0, &world).expect("save");
        let raw = saving.read_slot(0).expect("raw");

        let mut store = MemorySaveStore::new();
        store.write("save_0", &raw).expect("write");
        let loading = SaveManager::new(Box::new(store));

        assert!(matches!(
            loading.load(0, &world),
            Err(SnapshotError::MissingConfigLookup {
                type_name: "CharacterStats"
            })
        ));
    }

    #[test]
    fn file_store_slots_list_and_delete() {
        let temp = TempDir::new().expect("tempdir");
        let database = config_database();
        let (world, _) = world_with_player(&database);
        let mut manager = manager(
            Box::new(FileSaveStore::new(temp.path().join("saves"))),
            database,
        );

        manager.save(0, &world).expect("save 0");
        manager.save(7, &world).expect("save 7");
        assert_eq!(manager.list_slots().expect("list"), vec![0, 7]);
        assert!(temp.path().join("saves").join("save_7.json").is_file());

        assert!(manager.delete(7).expect("delete"));
        assert!(!manager.delete(7).expect("second delete"));
        assert_eq!(manager.list_slots().expect("list"), vec![0]);
        assert!(matches!(
            manager.load(7, &world),
            Err(SnapshotError::NotFound { slot: 7 })
        ));
    }
}
