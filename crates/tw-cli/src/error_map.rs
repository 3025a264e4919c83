use std::fmt::Display;

use tw_core::TweakError;

fn map_error(code: &'static str, error: impl Display) -> TweakError {
    TweakError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: TweakError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).unwrap_or_else(|_| "\"Unknown error\"".to_string())
    );
    1
}

pub(crate) fn map_cli_input_read(error: std::io::Error) -> TweakError {
    map_error("CLI_INPUT_READ", error)
}

pub(crate) fn map_cli_output_write(error: std::io::Error) -> TweakError {
    map_error("CLI_OUTPUT_WRITE", error)
}

pub(crate) fn map_cli_script_read(error: std::io::Error) -> TweakError {
    map_error("CLI_SCRIPT_READ", error)
}

pub(crate) fn map_lua_error(error: mlua::Error) -> TweakError {
    match tw_host::fatal_error(&error) {
        Some(fatal) => fatal.clone(),
        None => map_error("CLI_LUA_FAILED", error),
    }
}
