mod presentation;
mod scenes;
mod systems;

use std::path::Path;

use sim_core::persistence::{ConfigDatabase, ConfigError};
use tracing::info;

pub(crate) use presentation::{LoggingPresentation, PresentationStats};
pub(crate) use scenes::{build_scene_director, ARENA_SCENE, VILLAGE_SCENE};
pub(crate) use systems::{install_gameplay_systems, spawn_player, WAVE_CLEARED_TOPIC};

pub(crate) const DEFS_FILE_NAME: &str = "defs.json";

const BUILTIN_DEFS_JSON: &str = r#"[
    {
        "kind": "character",
        "def_name": "ranger",
        "label": "Ranger",
        "move_speed": 4.5,
        "health_max": 12,
        "tags": ["player", "ranged"]
    },
    {
        "kind": "character",
        "def_name": "slime",
        "label": "Slime",
        "move_speed": 0.5,
        "health_max": 3,
        "tags": ["hostile"]
    }
]"#;

/// Reads `defs.json` from `config_dir` when present, otherwise the built-in
/// definitions.
pub(crate) fn load_config_database(config_dir: &Path) -> Result<ConfigDatabase, ConfigError> {
    let path = config_dir.join(DEFS_FILE_NAME);
    if path.is_file() {
        let database = ConfigDatabase::load_json(&path)?;
        info!(path = %path.display(), defs = database.len(), "config_loaded");
        return Ok(database);
    }
    let database = ConfigDatabase::from_json_str(BUILTIN_DEFS_JSON)?;
    info!(defs = database.len(), "builtin_config_loaded");
    Ok(database)
}
