use std::fs;
use std::path::Path;
use std::sync::Arc;

use rhai::{Array, Dynamic, NativeCallContext};
use tracing::{debug, error, info};
use tw_core::{idstring_hex, TweakError};
use walkdir::WalkDir;

use super::manifest::{BASE_NATIVE, LUA_INTERFACE_NATIVE};
use super::{
    bool_arg, foreign, script_error, string_arg, BindingEnv, ForeignClass, ForeignFn,
    ForeignResolver, ScriptResult,
};
use crate::fatal::FatalSignal;
use crate::plugin::PluginLoader;
use crate::registry::{ObjectHandle, ObjectRegistry};

pub const SCRIPT_LOG_TARGET: &str = "tweaker::script";

/// Entry names of one directory level: sub-directories when `directories`
/// is set, regular files otherwise. Unreadable paths list as empty.
pub fn list_directory(path: &Path, directories: bool) -> Vec<String> {
    WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            if directories {
                entry.path().is_dir()
            } else {
                entry.path().is_file()
            }
        })
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name != "." && name != "..")
        .collect()
}

pub fn file_info(path: &Path) -> &'static str {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => "dir",
        Ok(_) => "file",
        Err(_) => "none",
    }
}

pub struct BuiltinBindings {
    registry: Arc<ObjectRegistry>,
    plugins: Arc<dyn PluginLoader>,
    fatal: Arc<FatalSignal>,
}

impl BuiltinBindings {
    pub fn new(env: &BindingEnv) -> Self {
        Self {
            registry: Arc::clone(&env.registry),
            plugins: Arc::clone(&env.plugins),
            fatal: Arc::clone(&env.fatal),
        }
    }
}

impl ForeignResolver for BuiltinBindings {
    fn bind_class(&self, _module: &str, _class: &str) -> Option<ForeignClass> {
        None
    }

    fn bind_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignFn> {
        if !is_static {
            return None;
        }
        let method = match (module, class, signature) {
            (BASE_NATIVE, "Logger", "log(_)") => foreign(logger_log),
            (BASE_NATIVE, "IO", "listDirectory(_,_)") => foreign(io_list_directory),
            (BASE_NATIVE, "IO", "info(_)") => foreign(io_info),
            (BASE_NATIVE, "IO", "read(_)") => {
                let fatal = Arc::clone(&self.fatal);
                foreign(move |_, args| io_read(&fatal, args))
            }
            (BASE_NATIVE, "IO", "idstring_hash(_)") => foreign(io_idstring_hash),
            (BASE_NATIVE, "IO", "load_plugin(_)") => {
                let plugins = Arc::clone(&self.plugins);
                foreign(move |_, args| io_load_plugin(plugins.as_ref(), args))
            }
            (LUA_INTERFACE_NATIVE, "LuaInterface", "register_object(_,_)") => {
                let registry = Arc::clone(&self.registry);
                foreign(move |context, args| register_object(&registry, context, args))
            }
            _ => return None,
        };
        Some(method)
    }
}

fn logger_log(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let text = args.first().map(|value| value.to_string()).unwrap_or_default();
    info!(target: SCRIPT_LOG_TARGET, "[SCRIPT] {}", text);
    Ok(Dynamic::UNIT)
}

fn io_list_directory(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let path = string_arg(args, 0, "IO.listDirectory")?;
    let directories = bool_arg(args, 1, "IO.listDirectory")?;
    let entries = list_directory(Path::new(&path), directories)
        .into_iter()
        .map(Dynamic::from)
        .collect::<Array>();
    Ok(Dynamic::from_array(entries))
}

fn io_info(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let path = string_arg(args, 0, "IO.info")?;
    Ok(Dynamic::from(file_info(Path::new(&path)).to_string()))
}

fn io_read(fatal: &FatalSignal, args: &mut [&mut Dynamic]) -> ScriptResult {
    let path = string_arg(args, 0, "IO.read")?;
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(Dynamic::from(contents)),
        Err(err) => {
            let message = format!("IO.read: Could not load file {}: {}", path, err);
            error!("{}", message);
            fatal.raise(TweakError::fatal("IO_READ_FAILED", message.clone()));
            Err(script_error(message))
        }
    }
}

fn io_idstring_hash(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let text = string_arg(args, 0, "IO.idstring_hash")?;
    Ok(Dynamic::from(idstring_hex(&text)))
}

fn io_load_plugin(plugins: &dyn PluginLoader, args: &mut [&mut Dynamic]) -> ScriptResult {
    let path = string_arg(args, 0, "IO.load_plugin")?;
    plugins
        .load_plugin(Path::new(&path))
        .map_err(|err| script_error(format!("LoadPlugin: {} : {}", path, err)))?;
    info!(plugin = %path, "loaded native plugin");
    Ok(Dynamic::UNIT)
}

fn register_object(
    registry: &ObjectRegistry,
    context: &NativeCallContext<'_>,
    args: &mut [&mut Dynamic],
) -> ScriptResult {
    let name = string_arg(args, 0, "LuaInterface.register_object")?;
    let caller = context.call_source().ok_or_else(|| {
        script_error("LuaInterface.register_object: calling module is unknown.")
    })?;
    let handle = args
        .get(1)
        .map(|value| ObjectHandle::owned_by(caller, (**value).clone()))
        .ok_or_else(|| script_error("LuaInterface.register_object: missing argument 2."))?;

    let full_name = registry
        .register(caller, &name, handle)
        .map_err(|err| script_error(err.to_string()))?;
    debug!(object = %full_name, module = caller, "registered interface object");
    Ok(Dynamic::UNIT)
}
