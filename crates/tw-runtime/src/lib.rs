pub mod asset_hooks;
pub mod bindings;
pub mod bridge;
pub mod context;
pub mod datastore;
pub mod fatal;
pub mod loader;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod signature;

pub use asset_hooks::{AssetHookError, AssetHookRegistry, AssetKey, AssetOverride};
pub use bindings::{BindingDispatcher, BindingEnv, SCRIPT_LOG_TARGET};
pub use bridge::{BridgeError, MAX_DIAGNOSTIC_LEN};
pub use context::{RuntimeStatus, TweakContext};
pub use datastore::{DataStore, FileDataStore, StringDataStore};
pub use fatal::FatalSignal;
pub use loader::{ModuleLoader, ModuleOrigin, ModuleSource};
pub use plugin::{PluginLoader, UnsupportedPluginLoader};
pub use registry::{ObjectHandle, ObjectRegistry, RegistryError};
pub use runtime::{CallFailure, EmbeddedRuntime, FailureKind};
pub use signature::CallSignature;
