use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, error, info};
use tw_core::{format_hash, BridgeValue, HostArg, TweakConfig, TweakError};

use crate::asset_hooks::{AssetHookRegistry, AssetKey};
use crate::bindings::BindingEnv;
use crate::bridge::{marshal_args, to_bridge_value, truncate_diagnostic, BridgeError};
use crate::datastore::DataStore;
use crate::fatal::FatalSignal;
use crate::loader::ModuleLoader;
use crate::plugin::{PluginLoader, UnsupportedPluginLoader};
use crate::registry::ObjectRegistry;
use crate::runtime::EmbeddedRuntime;
use crate::signature::CallSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Uninitialized,
    Active,
    Disabled,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Uninitialized => f.write_str("uninitialized"),
            RuntimeStatus::Active => f.write_str("active"),
            RuntimeStatus::Disabled => f.write_str("disabled"),
        }
    }
}

enum RuntimeState {
    Uninitialized,
    Active(Box<EmbeddedRuntime>),
    Disabled,
}

impl RuntimeState {
    fn status(&self) -> RuntimeStatus {
        match self {
            RuntimeState::Uninitialized => RuntimeStatus::Uninitialized,
            RuntimeState::Active(_) => RuntimeStatus::Active,
            RuntimeState::Disabled => RuntimeStatus::Disabled,
        }
    }
}

/// Owns the embedded runtime and everything shared with it. One context
/// serves every tweak and bridge call of a process.
///
/// Calls into the runtime serialize on the VM lock. The object registry has
/// its own lock, which is never held while the VM lock is being acquired.
pub struct TweakContext {
    config: TweakConfig,
    registry: Arc<ObjectRegistry>,
    asset_hooks: Arc<AssetHookRegistry>,
    plugins: Arc<dyn PluginLoader>,
    fatal: Arc<FatalSignal>,
    vm: Mutex<RuntimeState>,
    ignored: Mutex<HashSet<AssetKey>>,
    enabled: AtomicBool,
    driver_thread: OnceLock<ThreadId>,
}

impl TweakContext {
    pub fn new(config: TweakConfig) -> Self {
        Self::with_plugin_loader(config, Arc::new(UnsupportedPluginLoader))
    }

    pub fn with_plugin_loader(config: TweakConfig, plugins: Arc<dyn PluginLoader>) -> Self {
        Self {
            config,
            registry: Arc::new(ObjectRegistry::new()),
            asset_hooks: Arc::new(AssetHookRegistry::new()),
            plugins,
            fatal: Arc::new(FatalSignal::new()),
            vm: Mutex::new(RuntimeState::Uninitialized),
            ignored: Mutex::new(HashSet::new()),
            enabled: AtomicBool::new(true),
            driver_thread: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &TweakConfig {
        &self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    fn vm(&self) -> MutexGuard<'_, RuntimeState> {
        self.vm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ignored(&self) -> MutexGuard<'_, HashSet<AssetKey>> {
        self.ignored.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RuntimeStatus {
        self.vm().status()
    }

    /// Brings the runtime up if that has not been attempted yet. A missing
    /// entry module disables the context for good and is not an error.
    pub fn initialize(&self) -> Result<RuntimeStatus, TweakError> {
        let mut state = self.vm();
        self.ensure_active(&mut state)?;
        Ok(state.status())
    }

    fn ensure_active<'s>(
        &self,
        state: &'s mut RuntimeState,
    ) -> Result<Option<&'s mut EmbeddedRuntime>, TweakError> {
        if matches!(state, RuntimeState::Uninitialized) {
            match self.start() {
                Ok(next) => *state = next,
                Err(error) => {
                    *state = RuntimeState::Disabled;
                    return Err(error);
                }
            }
        }
        match state {
            RuntimeState::Active(runtime) => Ok(Some(runtime.as_mut())),
            _ => Ok(None),
        }
    }

    fn start(&self) -> Result<RuntimeState, TweakError> {
        if !ModuleLoader::new(self.config.clone()).entry_exists() {
            info!(
                entry = %self.config.entry_module,
                mods_dir = %self.config.mods_dir.display(),
                "entry module not found, tweaking disabled"
            );
            return Ok(RuntimeState::Disabled);
        }

        let env = BindingEnv {
            registry: Arc::clone(&self.registry),
            asset_hooks: Arc::clone(&self.asset_hooks),
            plugins: Arc::clone(&self.plugins),
            fatal: Arc::clone(&self.fatal),
        };
        let runtime = EmbeddedRuntime::bootstrap(&self.config, &env)
            .map_err(|error| self.fatal.current().unwrap_or(error))?;
        self.check_fatal()?;
        Ok(RuntimeState::Active(Box::new(runtime)))
    }

    fn check_fatal(&self) -> Result<(), TweakError> {
        match self.fatal.current() {
            Some(error) => {
                error!(code = %error.code, "{}", error.message);
                Err(error)
            }
            None => Ok(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn ignore_file(&self, name_hash: u64, ext_hash: u64) {
        self.ignored().insert(AssetKey::new(name_hash, ext_hash));
    }

    pub fn is_ignored(&self, name_hash: u64, ext_hash: u64) -> bool {
        self.ignored().contains(&AssetKey::new(name_hash, ext_hash))
    }

    /// Runs `text` through the base tweaker. Script failures are logged and
    /// the input comes back unchanged; only fatal conditions return `Err`.
    pub fn tweak<'a>(
        &self,
        name_hash: u64,
        ext_hash: u64,
        text: &'a str,
    ) -> Result<Cow<'a, str>, TweakError> {
        if !self.is_enabled() || self.is_ignored(name_hash, ext_hash) {
            return Ok(Cow::Borrowed(text));
        }

        let mut state = self.vm();
        let Some(runtime) = self.ensure_active(&mut state)? else {
            return Ok(Cow::Borrowed(text));
        };
        match runtime.tweak(name_hash, ext_hash, text) {
            Ok(tweaked) => {
                self.check_fatal()?;
                if tweaked == text {
                    Ok(Cow::Borrowed(text))
                } else {
                    debug!(
                        name = %format_hash(name_hash),
                        ext = %format_hash(ext_hash),
                        "asset rewritten"
                    );
                    Ok(Cow::Owned(tweaked))
                }
            }
            Err(failure) => {
                self.check_fatal()?;
                error!(
                    name = %format_hash(name_hash),
                    ext = %format_hash(ext_hash),
                    "tweak failed, passing asset through: {}",
                    failure
                );
                Ok(Cow::Borrowed(text))
            }
        }
    }

    /// Calls `method` on the registered object `object` with `args`.
    pub fn invoke(
        &self,
        object: &str,
        method: &str,
        args: &[HostArg],
    ) -> Result<BridgeValue, BridgeError> {
        let signature = CallSignature::new(method, args.len());
        if signature.is_private() {
            return Err(BridgeError::PrivateMethod {
                signature: signature.to_string(),
            });
        }
        if !signature.is_callable_name() {
            return Err(BridgeError::InvalidMethodName {
                signature: signature.to_string(),
            });
        }

        let handle = match self.registry.lookup(object) {
            Some(handle) => handle,
            None => {
                // Objects only appear once the runtime has run its modules.
                if self.status() == RuntimeStatus::Uninitialized {
                    self.initialize().map_err(BridgeError::Fatal)?;
                }
                self.registry
                    .lookup(object)
                    .ok_or_else(|| BridgeError::NoSuchObject {
                        object: object.to_string(),
                    })?
            }
        };

        let mut state = self.vm();
        let runtime = self
            .ensure_active(&mut state)
            .map_err(BridgeError::Fatal)?
            .ok_or(BridgeError::Unavailable)?;
        let values = marshal_args(args)?;

        debug!(object, signature = %signature, "bridge call");
        match runtime.call(handle.value(), handle.module(), &signature, values) {
            Ok(value) => {
                self.check_fatal().map_err(BridgeError::Fatal)?;
                Ok(to_bridge_value(value))
            }
            Err(failure) => {
                self.check_fatal().map_err(BridgeError::Fatal)?;
                let diagnostic = failure.to_string();
                error!(object, signature = %signature, "bridge call failed: {}", diagnostic);
                Err(BridgeError::Invocation {
                    object: object.to_string(),
                    signature: signature.to_string(),
                    diagnostic: truncate_diagnostic(&diagnostic),
                })
            }
        }
    }

    /// Records the calling thread as the one that drives `host_update`.
    /// Returns whether the calling thread is the driver.
    pub fn claim_driver_thread(&self) -> bool {
        let current = thread::current().id();
        *self.driver_thread.get_or_init(|| current) == current
    }

    /// Per-frame hook. Runs the base object's update method on the driving
    /// thread once the runtime is active; never starts the runtime itself.
    pub fn host_update(&self) -> Result<(), TweakError> {
        if self.driver_thread.get() != Some(&thread::current().id()) {
            return Ok(());
        }
        let mut state = self.vm();
        let RuntimeState::Active(runtime) = &mut *state else {
            return Ok(());
        };
        if !runtime.has_update() {
            return Ok(());
        }
        match runtime.update() {
            Ok(()) => self.check_fatal(),
            Err(failure) => {
                self.check_fatal()?;
                error!("update failed: {}", failure);
                Ok(())
            }
        }
    }

    pub fn open_asset_override(&self, name_hash: u64, ext_hash: u64) -> Option<Box<dyn DataStore>> {
        self.asset_hooks.open(AssetKey::new(name_hash, ext_hash))
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        match &*self.vm() {
            RuntimeState::Active(runtime) => runtime.loaded_modules(),
            _ => Vec::new(),
        }
    }
}
