//! Coordination store and logging settings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Directory holding one JSON file per entry. Relative paths resolve
    /// against the working directory.
    pub dir: String,
    /// Write entries to disk. When false the store lives in memory only.
    pub auto_persist: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            dir: "shared_memory".to_string(),
            auto_persist: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// One of trace, debug, info, warn, error.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
