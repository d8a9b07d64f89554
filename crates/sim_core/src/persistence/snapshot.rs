use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const SLOT_COUNT: u32 = 10;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("save slot {slot} is out of range (expected 0..{SLOT_COUNT})")]
    InvalidSlot { slot: u32 },
    #[error("no save in slot {slot}")]
    NotFound { slot: u32 },
    #[error("no player entity found to save")]
    NoPlayer,
    #[error("snapshot version {found} does not match supported version {expected}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("save storage failed for '{key}': {source}")]
    Storage {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse snapshot at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot references unknown component type '{0}'")]
    UnknownComponent(String),
    #[error("failed to decode component '{type_name}': {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("config reference {kind}/{id} could not be resolved")]
    UnresolvedReference { kind: String, id: String },
    #[error("a config lookup is required to restore '{type_name}'")]
    MissingConfigLookup { type_name: &'static str },
}

/// On-disk form of a save slot. Entities carry no identity; loading
/// creates fresh handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub timestamp_ms: u64,
    pub entities: Vec<EntityRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub components: Vec<ComponentRecord>,
}

impl EntityRecord {
    pub fn component(&self, type_name: &str) -> Option<&Value> {
        self.components
            .iter()
            .find(|record| record.type_name == type_name)
            .map(|record| &record.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub data: Value,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl Snapshot {
    pub fn new(timestamp_ms: u64, entities: Vec<EntityRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp_ms,
            entities,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(SnapshotError::Encode)
    }

    /// Parses without checking the version.
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        parse_with_path(raw)
    }

    /// The version is checked before anything else is decoded, so a
    /// snapshot from another format revision fails as a version mismatch
    /// even when its layout changed.
    pub fn from_json_strict(raw: &str) -> Result<Self, SnapshotError> {
        let probe: VersionProbe = parse_with_path(raw)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: probe.version,
            });
        }
        parse_with_path(raw)
    }
}

fn parse_with_path<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, SnapshotError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| SnapshotError::Parse {
        path: error.path().to_string(),
        source: error.into_inner(),
    })
}

pub fn slot_key(slot: u32) -> Result<String, SnapshotError> {
    if slot >= SLOT_COUNT {
        return Err(SnapshotError::InvalidSlot { slot });
    }
    Ok(format!("save_{slot}"))
}
