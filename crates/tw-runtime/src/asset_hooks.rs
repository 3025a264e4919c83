use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tw_core::format_hash;

use crate::datastore::{DataStore, FileDataStore, StringDataStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub name_hash: u64,
    pub ext_hash: u64,
}

impl AssetKey {
    pub fn new(name_hash: u64, ext_hash: u64) -> Self {
        Self {
            name_hash,
            ext_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOverride {
    PlainFile(PathBuf),
    Content(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetHookError {
    #[error("An asset hook for {name}.{ext} is already registered.")]
    AlreadyRegistered { name: String, ext: String },
    #[error("No asset hook is registered for {name}.{ext}.")]
    NotRegistered { name: String, ext: String },
}

impl AssetHookError {
    fn already_registered(key: AssetKey) -> Self {
        Self::AlreadyRegistered {
            name: format_hash(key.name_hash),
            ext: format_hash(key.ext_hash),
        }
    }

    fn not_registered(key: AssetKey) -> Self {
        Self::NotRegistered {
            name: format_hash(key.name_hash),
            ext: format_hash(key.ext_hash),
        }
    }
}

/// Asset overrides declared by scripts. A hook is registered once and its
/// override may then be set or cleared any number of times.
#[derive(Debug, Default)]
pub struct AssetHookRegistry {
    hooks: Mutex<HashMap<AssetKey, Option<AssetOverride>>>,
}

impl AssetHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn hooks(&self) -> MutexGuard<'_, HashMap<AssetKey, Option<AssetOverride>>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, key: AssetKey) -> Result<(), AssetHookError> {
        let mut hooks = self.hooks();
        if hooks.contains_key(&key) {
            return Err(AssetHookError::already_registered(key));
        }
        hooks.insert(key, None);
        Ok(())
    }

    pub fn set(&self, key: AssetKey, value: Option<AssetOverride>) -> Result<(), AssetHookError> {
        let mut hooks = self.hooks();
        let slot = hooks
            .get_mut(&key)
            .ok_or_else(|| AssetHookError::not_registered(key))?;
        *slot = value;
        Ok(())
    }

    pub fn get(&self, key: AssetKey) -> Option<AssetOverride> {
        self.hooks().get(&key).cloned().flatten()
    }

    pub fn is_registered(&self, key: AssetKey) -> bool {
        self.hooks().contains_key(&key)
    }

    /// Opens the override for `key`, if any. A plain-file override whose file
    /// cannot be opened yields `None` so the host falls back to its own copy.
    pub fn open(&self, key: AssetKey) -> Option<Box<dyn DataStore>> {
        match self.get(key)? {
            AssetOverride::PlainFile(path) => {
                FileDataStore::open(&path).map(|store| Box::new(store) as Box<dyn DataStore>)
            }
            AssetOverride::Content(contents) => Some(Box::new(StringDataStore::new(contents))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn hooks_register_once() {
        let registry = AssetHookRegistry::new();
        let key = AssetKey::new(1, 2);
        registry.register(key).expect("first register");
        assert!(matches!(
            registry.register(key),
            Err(AssetHookError::AlreadyRegistered { .. })
        ));
        assert!(registry.is_registered(key));
        assert_eq!(registry.get(key), None);
    }

    #[test]
    fn set_requires_registered_hook() {
        let registry = AssetHookRegistry::new();
        let error = registry
            .set(AssetKey::new(1, 2), Some(AssetOverride::Content("x".to_string())))
            .expect_err("unregistered hook should fail");
        assert_eq!(
            error.to_string(),
            "No asset hook is registered for 0000000000000001.0000000000000002."
        );
    }

    #[test]
    fn open_serves_content_and_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("replacement.xml");
        fs::write(&path, "<file/>").expect("write file");

        let registry = AssetHookRegistry::new();
        let content_key = AssetKey::new(10, 20);
        let file_key = AssetKey::new(11, 20);
        registry.register(content_key).expect("register");
        registry.register(file_key).expect("register");
        registry
            .set(content_key, Some(AssetOverride::Content("<mem/>".to_string())))
            .expect("set content");
        registry
            .set(file_key, Some(AssetOverride::PlainFile(path)))
            .expect("set file");

        let mut content = registry.open(content_key).expect("content store");
        let mut buf = [0u8; 16];
        let count = content.read(0, &mut buf).expect("read");
        assert_eq!(&buf[..count], b"<mem/>");
        assert_eq!(registry.open(file_key).expect("file store").size(), 7);

        registry.set(content_key, None).expect("clear");
        assert!(registry.open(content_key).is_none());
        assert!(registry.open(AssetKey::new(99, 99)).is_none());
    }
}
