use std::path::PathBuf;
use std::sync::Arc;

use rhai::{Dynamic, NativeCallContext};
use tw_core::idstring_hash;

use super::manifest::DB_NATIVE;
use super::{
    foreign, script_error, string_arg, typed_arg, ForeignClass, ForeignFn, ForeignResolver,
    ScriptResult,
};
use crate::asset_hooks::{AssetHookRegistry, AssetKey, AssetOverride};

/// Script-side handle for one registered asset override.
#[derive(Clone)]
pub struct ScriptAssetHook {
    key: AssetKey,
    hooks: Arc<AssetHookRegistry>,
}

impl ScriptAssetHook {
    pub fn key(&self) -> AssetKey {
        self.key
    }

    fn set(&self, value: Option<AssetOverride>) -> ScriptResult {
        self.hooks
            .set(self.key, value)
            .map_err(|err| script_error(err.to_string()))?;
        Ok(Dynamic::UNIT)
    }
}

pub struct DatastoreBindings {
    hooks: Arc<AssetHookRegistry>,
}

impl DatastoreBindings {
    pub fn new(hooks: Arc<AssetHookRegistry>) -> Self {
        Self { hooks }
    }
}

impl ForeignResolver for DatastoreBindings {
    fn bind_class(&self, module: &str, class: &str) -> Option<ForeignClass> {
        (module == DB_NATIVE && class == "AssetHook")
            .then(|| ForeignClass::of::<ScriptAssetHook>("AssetHook"))
    }

    fn bind_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignFn> {
        if module != DB_NATIVE {
            return None;
        }
        let method = match (class, is_static, signature) {
            ("DBManager", true, "register_asset_hook(_,_)") => {
                let hooks = Arc::clone(&self.hooks);
                foreign(move |_, args| register_asset_hook(&hooks, args))
            }
            ("AssetHook", false, "set_plain_file(_)") => foreign(hook_set_plain_file),
            ("AssetHook", false, "set_content(_)") => foreign(hook_set_content),
            ("AssetHook", false, "clear()") => foreign(hook_clear),
            ("AssetHook", false, "enabled()") => foreign(hook_enabled),
            _ => return None,
        };
        Some(method)
    }
}

fn register_asset_hook(hooks: &Arc<AssetHookRegistry>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let name = string_arg(args, 0, "DBManager.register_asset_hook")?;
    let ext = string_arg(args, 1, "DBManager.register_asset_hook")?;
    let key = AssetKey::new(idstring_hash(&name), idstring_hash(&ext));
    hooks.register(key).map_err(|err| {
        script_error(format!(
            "DBManager.register_asset_hook: {} ({}.{})",
            err, name, ext
        ))
    })?;
    Ok(Dynamic::from(ScriptAssetHook {
        key,
        hooks: Arc::clone(hooks),
    }))
}

fn hook_set_plain_file(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let path = string_arg(args, 1, "AssetHook.set_plain_file")?;
    let hook = typed_arg::<ScriptAssetHook>(args, 0, "AssetHook.set_plain_file", "an AssetHook")?;
    hook.set(Some(AssetOverride::PlainFile(PathBuf::from(path))))
}

fn hook_set_content(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let contents = string_arg(args, 1, "AssetHook.set_content")?;
    let hook = typed_arg::<ScriptAssetHook>(args, 0, "AssetHook.set_content", "an AssetHook")?;
    hook.set(Some(AssetOverride::Content(contents)))
}

fn hook_clear(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let hook = typed_arg::<ScriptAssetHook>(args, 0, "AssetHook.clear", "an AssetHook")?;
    hook.set(None)
}

fn hook_enabled(_: &NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult {
    let hook = typed_arg::<ScriptAssetHook>(args, 0, "AssetHook.enabled", "an AssetHook")?;
    Ok(Dynamic::from_bool(hook.hooks.get(hook.key).is_some()))
}
