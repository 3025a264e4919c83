use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rhai::Dynamic;
use thiserror::Error;

/// A value owned by the embedded runtime. The host side only ever names it.
#[derive(Clone)]
pub struct ObjectHandle {
    value: Dynamic,
    module: Option<String>,
}

impl ObjectHandle {
    pub fn new(value: Dynamic) -> Self {
        Self {
            value,
            module: None,
        }
    }

    /// A value created by the script module `module`. Calls on it run with
    /// that module's imports in scope.
    pub fn owned_by(module: impl Into<String>, value: Dynamic) -> Self {
        Self {
            value,
            module: Some(module.into()),
        }
    }

    pub(crate) fn value(&self) -> &Dynamic {
        &self.value
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("type", &self.value.type_name())
            .field("module", &self.module)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Failed to register interface object: name \"{full_name}\" is already taken.")]
    NameCollision { full_name: String },
    #[error("Failed to register interface object: name must not be empty.")]
    EmptyName,
}

pub fn caller_namespace(module: &str) -> &str {
    match module.find('/') {
        Some(end) => &module[..end],
        None => module,
    }
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: Mutex<HashMap<String, ObjectHandle>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, ObjectHandle>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handle` as `{namespace}/{local_name}`, where the namespace
    /// is the first path segment of `caller_module`. Returns the full name.
    pub fn register(
        &self,
        caller_module: &str,
        local_name: &str,
        handle: ObjectHandle,
    ) -> Result<String, RegistryError> {
        if local_name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let full_name = format!("{}/{}", caller_namespace(caller_module), local_name);

        let mut objects = self.objects();
        if objects.contains_key(&full_name) {
            return Err(RegistryError::NameCollision { full_name });
        }
        objects.insert(full_name.clone(), handle);
        Ok(full_name)
    }

    pub fn lookup(&self, full_name: &str) -> Option<ObjectHandle> {
        self.objects().get(full_name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.objects().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
