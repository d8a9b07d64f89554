use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Load-time configuration shared by every component that references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDef {
    pub kind: String,
    pub def_name: String,
    pub label: String,
    #[serde(default)]
    pub move_speed: f32,
    #[serde(default)]
    pub health_max: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Resolves `(kind, id)` references written by reference-filtered
/// serializers. Must be populated before any snapshot is loaded.
pub trait ConfigLookup {
    fn component_config(&self, kind: &str, id: &str) -> Option<Arc<ConfigDef>>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Clone)]
pub struct ConfigDatabase {
    defs: Vec<Arc<ConfigDef>>,
    ids_by_key: HashMap<(String, String), usize>,
}

impl ConfigDatabase {
    /// Later definitions with the same kind and name replace earlier ones.
    pub fn from_defs(defs: Vec<ConfigDef>) -> Self {
        let mut database = Self::default();
        for def in defs {
            database.insert(def);
        }
        database
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let defs: Vec<ConfigDef> = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| ConfigError::Parse {
                path: error.path().to_string(),
                source: error.into_inner(),
            },
        )?;
        Ok(Self::from_defs(defs))
    }

    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn insert(&mut self, def: ConfigDef) -> Arc<ConfigDef> {
        let key = (def.kind.clone(), def.def_name.clone());
        let def = Arc::new(def);
        match self.ids_by_key.get(&key) {
            Some(&index) => {
                warn!(kind = %key.0, def_name = %key.1, "config_def_replaced");
                self.defs[index] = Arc::clone(&def);
            }
            None => {
                self.ids_by_key.insert(key, self.defs.len());
                self.defs.push(Arc::clone(&def));
            }
        }
        def
    }

    pub fn get(&self, kind: &str, def_name: &str) -> Option<&Arc<ConfigDef>> {
        let index = self
            .ids_by_key
            .get(&(kind.to_string(), def_name.to_string()))?;
        self.defs.get(*index)
    }

    pub fn defs(&self) -> &[Arc<ConfigDef>] {
        &self.defs
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl ConfigLookup for ConfigDatabase {
    fn component_config(&self, kind: &str, id: &str) -> Option<Arc<ConfigDef>> {
        self.get(kind, id).cloned()
    }
}
