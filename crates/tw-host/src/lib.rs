//! Lua side of the invocation bridge.
//!
//! Installs `tweaker.script_io.invoke(object, options, method, ...)` into a
//! Lua state so host scripts can call objects registered by mod scripts.

use std::sync::Arc;

use mlua::prelude::*;
use mlua::Variadic;
use tracing::debug;
use tw_core::{idstring_hex, BridgeValue, HostArg, TweakError};
use tw_runtime::{BridgeError, TweakContext};

pub const HOST_TABLE: &str = "tweaker";
pub const SCRIPT_IO_TABLE: &str = "script_io";

pub fn to_host_arg(value: &LuaValue) -> HostArg {
    match value {
        LuaValue::Integer(number) => HostArg::Integer(*number),
        LuaValue::Number(number) => HostArg::Number(*number),
        LuaValue::String(text) => HostArg::String(String::from(text.to_string_lossy())),
        other => HostArg::Unsupported(other.type_name().to_string()),
    }
}

pub fn to_lua_value(lua: &Lua, value: BridgeValue) -> LuaResult<LuaValue> {
    Ok(match value {
        BridgeValue::Nil => LuaValue::Nil,
        BridgeValue::Bool(flag) => LuaValue::Boolean(flag),
        BridgeValue::Integer(number) => LuaValue::Integer(number),
        BridgeValue::Number(number) => LuaValue::Number(number),
        BridgeValue::String(text) => LuaValue::String(lua.create_string(&text)?),
    })
}

fn bridge_failure(error: BridgeError) -> LuaError {
    match error {
        BridgeError::Fatal(error) => LuaError::external(error),
        other => LuaError::RuntimeError(other.to_string()),
    }
}

/// Finds a fatal error raised by the bridge anywhere in a Lua error chain.
/// The caller owning the process decides how to terminate on it.
pub fn fatal_error(error: &LuaError) -> Option<&TweakError> {
    match error {
        LuaError::ExternalError(inner) => inner
            .downcast_ref::<TweakError>()
            .filter(|error| error.is_fatal()),
        LuaError::CallbackError { cause, .. } => fatal_error(cause),
        LuaError::WithContext { cause, .. } => fatal_error(cause),
        _ => None,
    }
}

/// Adds `invoke`, `idstring_hash` and `update` to `table`.
pub fn register_host_functions(
    lua: &Lua,
    table: &LuaTable,
    context: Arc<TweakContext>,
) -> LuaResult<()> {
    let invoke_context = Arc::clone(&context);
    let invoke = lua.create_function(
        move |lua, (object, options, method, args): (String, LuaValue, String, Variadic<LuaValue>)| {
            if !matches!(options, LuaValue::Nil | LuaValue::Table(_)) {
                return Err(LuaError::RuntimeError(format!(
                    "Bad argument #2 to invoke: expected table or nil, got {}.",
                    options.type_name()
                )));
            }
            let args = args.iter().map(to_host_arg).collect::<Vec<_>>();
            debug!(object = %object, method = %method, args = args.len(), "host invoke");
            let result = invoke_context
                .invoke(&object, &method, &args)
                .map_err(bridge_failure)?;
            to_lua_value(lua, result)
        },
    )?;
    table.set("invoke", invoke)?;

    let hash = lua.create_function(|_, text: String| Ok(idstring_hex(&text)))?;
    table.set("idstring_hash", hash)?;

    let update = lua.create_function(move |_, ()| {
        context.host_update().map_err(LuaError::external)
    })?;
    table.set("update", update)?;
    Ok(())
}

/// Installs the bridge as the global `tweaker.script_io`.
pub fn install(lua: &Lua, context: Arc<TweakContext>) -> LuaResult<()> {
    let globals = lua.globals();
    let host = match globals.get::<Option<LuaTable>>(HOST_TABLE)? {
        Some(table) => table,
        None => lua.create_table()?,
    };
    let script_io = lua.create_table()?;
    register_host_functions(lua, &script_io, context)?;
    host.set(SCRIPT_IO_TABLE, script_io)?;
    globals.set(HOST_TABLE, host)?;
    Ok(())
}
