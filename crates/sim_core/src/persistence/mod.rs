mod atomic_io;
mod config;
mod manager;
mod serializer;
mod snapshot;
mod store;

pub use config::{ConfigDatabase, ConfigDef, ConfigError, ConfigLookup};
pub use manager::{
    DefaultPlayerLocator, LoadedWorld, PlayerLocator, SaveInfo, SaveManager, PLAYER_NAME,
};
pub use serializer::{
    CharacterStatsSerializer, ComponentSerializer, ConfigRef, HealthSerializer, NameSerializer,
    PositionSerializer, SerializationPolicy, SerializerRegistry, SpriteViewSerializer,
};
pub use snapshot::{
    slot_key, ComponentRecord, EntityRecord, Snapshot, SnapshotError, SLOT_COUNT,
    SNAPSHOT_VERSION,
};
pub use store::{FileSaveStore, MemorySaveStore, SaveStore};
