use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, warn};
use tw_core::TweakConfig;

const BUILTIN_SOURCES: &[(&str, &str)] = &[(
    "base/private/xml_helpers",
    include_str!("builtin/xml_helpers.rhai"),
)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Builtin,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub path: String,
    pub text: String,
    pub origin: ModuleOrigin,
}

pub fn builtin_source(path: &str) -> Option<&'static str> {
    BUILTIN_SOURCES
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, text)| *text)
}

/// Splits `mod_id/relative/file` at the first separator. A path without a
/// separator names the same mod and file.
pub fn split_module_path(path: &str) -> Option<(&str, &str)> {
    if path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return None;
    }
    match path.find('/') {
        Some(end) => Some((&path[..end], &path[end + 1..])),
        None => Some((path, path)),
    }
}

#[derive(Debug, Clone)]
pub struct ModuleLoader {
    config: TweakConfig,
}

impl ModuleLoader {
    pub fn new(config: TweakConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TweakConfig {
        &self.config
    }

    pub fn file_path(&self, path: &str) -> Option<PathBuf> {
        let (mod_id, file) = split_module_path(path)?;
        Some(self.config.script_path(mod_id, file))
    }

    pub fn entry_exists(&self) -> bool {
        if builtin_source(&self.config.entry_module).is_some() {
            return true;
        }
        self.file_path(&self.config.entry_module)
            .is_some_and(|path| path.is_file())
    }

    /// Returns `None` when the module does not exist.
    pub fn load(&self, path: &str) -> Option<ModuleSource> {
        if let Some(text) = builtin_source(path) {
            debug!(module = path, "resolved built-in module");
            return Some(ModuleSource {
                path: path.to_string(),
                text: text.to_string(),
                origin: ModuleOrigin::Builtin,
            });
        }

        let Some(file) = self.file_path(path) else {
            warn!(module = path, "refusing malformed module path");
            return None;
        };
        match fs::read_to_string(&file) {
            Ok(text) => {
                debug!(module = path, file = %file.display(), "resolved module from disk");
                Some(ModuleSource {
                    path: path.to_string(),
                    text,
                    origin: ModuleOrigin::File(file),
                })
            }
            Err(error) if error.kind() == ErrorKind::NotFound => None,
            Err(error) => {
                warn!(module = path, file = %file.display(), %error, "module file is unreadable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn write_script(root: &Path, relative: &str, text: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("script parent")).expect("create dirs");
        fs::write(path, text).expect("write script");
    }

    #[test]
    fn split_module_path_uses_first_segment_as_mod() {
        assert_eq!(split_module_path("base/base"), Some(("base", "base")));
        assert_eq!(
            split_module_path("weapons/rules/ak47"),
            Some(("weapons", "rules/ak47"))
        );
        assert_eq!(split_module_path("solo"), Some(("solo", "solo")));
    }

    #[test]
    fn split_module_path_refuses_traversal_and_empty_segments() {
        assert_eq!(split_module_path("base/../secret"), None);
        assert_eq!(split_module_path("base//file"), None);
        assert_eq!(split_module_path("/etc/passwd"), None);
        assert_eq!(split_module_path(""), None);
        assert_eq!(split_module_path("base/./file"), None);
    }

    #[test]
    fn builtin_sources_win_over_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_script(
            dir.path(),
            "base/scripts/private/xml_helpers.rhai",
            "fn shadowed() { 1 }",
        );
        let loader = ModuleLoader::new(TweakConfig::with_mods_dir(dir.path()));
        let source = loader
            .load("base/private/xml_helpers")
            .expect("built-in should resolve");
        assert_eq!(source.origin, ModuleOrigin::Builtin);
        assert!(source.text.contains("fn find_descendants"));
    }

    #[test]
    fn disk_modules_resolve_under_script_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_script(dir.path(), "weapons/scripts/rules/ak47.rhai", "let a = 1;");
        let loader = ModuleLoader::new(TweakConfig::with_mods_dir(dir.path()));

        let source = loader.load("weapons/rules/ak47").expect("module should resolve");
        assert_eq!(source.text, "let a = 1;");
        assert_eq!(
            source.origin,
            ModuleOrigin::File(dir.path().join("weapons/scripts/rules/ak47.rhai"))
        );
        assert_eq!(loader.load("weapons/rules/missing"), None);
        assert_eq!(loader.load("weapons/../weapons/rules/ak47"), None);
    }

    #[test]
    fn entry_exists_tracks_base_module_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = ModuleLoader::new(TweakConfig::with_mods_dir(dir.path()));
        assert!(!loader.entry_exists());

        write_script(dir.path(), "base/scripts/base.rhai", "");
        assert!(loader.entry_exists());
    }
}
