use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TweakError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
pub struct TweakConfig {
    pub mods_dir: PathBuf,
    pub script_dir: String,
    pub script_extension: String,
    pub entry_module: String,
    pub base_object: String,
    pub tweak_method: String,
    pub update_method: String,
}

impl Default for TweakConfig {
    fn default() -> Self {
        Self {
            mods_dir: PathBuf::from("mods"),
            script_dir: "scripts".to_string(),
            script_extension: "rhai".to_string(),
            entry_module: "base/base".to_string(),
            base_object: "BaseTweaker".to_string(),
            tweak_method: "tweak".to_string(),
            update_method: "update".to_string(),
        }
    }
}

impl TweakConfig {
    pub fn with_mods_dir(mods_dir: impl Into<PathBuf>) -> Self {
        Self {
            mods_dir: mods_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self, TweakError> {
        serde_json::from_str(source)
            .map_err(|error| TweakError::new("CONFIG_INVALID", error.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, TweakError> {
        let source = fs::read_to_string(path).map_err(|error| {
            TweakError::new(
                "CONFIG_READ",
                format!("Failed to read config {}: {}", path.display(), error),
            )
        })?;
        Self::from_json_str(&source)
    }

    /// On-disk location of a `{mod_id}/{file}` module path.
    pub fn script_path(&self, mod_id: &str, file: &str) -> PathBuf {
        self.mods_dir
            .join(mod_id)
            .join(&self.script_dir)
            .join(format!("{}.{}", file, self.script_extension))
    }
}
