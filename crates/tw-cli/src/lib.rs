use std::ffi::OsString;
use std::fs;
use std::sync::Arc;

use clap::Parser;
use mlua::Lua;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tw_api::Tweaker;
use tw_core::{idstring_hash, idstring_hex, TweakConfig, TweakError};

mod cli_args;
mod error_map;

pub(crate) use cli_args::{Cli, Command, ConfigArgs, HashArgs, LuaArgs, TweakArgs};
pub(crate) use error_map::{
    emit_error, map_cli_input_read, map_cli_output_write, map_cli_script_read, map_lua_error,
};

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, TweakError> {
    match cli.command {
        Command::Tweak(args) => run_tweak(&cli.config, args),
        Command::Hash(args) => run_hash(args),
        Command::Lua(args) => run_lua(&cli.config, args),
    }
}

fn resolve_config(args: &ConfigArgs) -> Result<TweakConfig, TweakError> {
    let mut config = match &args.config {
        Some(path) => TweakConfig::from_json_file(path)?,
        None => TweakConfig::default(),
    };
    if let Some(mods_dir) = &args.mods_dir {
        config.mods_dir = mods_dir.clone();
    }
    if let Some(entry_module) = &args.entry_module {
        config.entry_module = entry_module.clone();
    }
    Ok(config)
}

fn run_tweak(config: &ConfigArgs, args: TweakArgs) -> Result<i32, TweakError> {
    let tweaker = Tweaker::new(resolve_config(config)?);
    let data = fs::read(&args.input).map_err(map_cli_input_read)?;
    let buffer = tweaker.tweak_buffer(idstring_hash(&args.name), idstring_hash(&args.ext), &data)?;

    println!("RESULT:OK");
    println!("STATUS:{}", tweaker.status());
    println!("CHANGED:{}", buffer.is_replaced());
    match args.output {
        Some(path) => {
            fs::write(&path, buffer.as_bytes()).map_err(map_cli_output_write)?;
            println!("OUTPUT:{}", path.display());
        }
        None => {
            let text = String::from_utf8_lossy(buffer.as_bytes());
            println!(
                "TEXT_JSON:{}",
                serde_json::to_string(&text).unwrap_or_else(|_| "\"\"".to_string())
            );
        }
    }
    Ok(0)
}

fn run_hash(args: HashArgs) -> Result<i32, TweakError> {
    println!("RESULT:OK");
    for text in args.texts {
        println!("HASH:{}|{}", idstring_hex(&text), text);
    }
    Ok(0)
}

fn run_lua(config: &ConfigArgs, args: LuaArgs) -> Result<i32, TweakError> {
    let tweaker = Tweaker::new(resolve_config(config)?);
    tweaker.context().claim_driver_thread();
    let source = fs::read_to_string(&args.script).map_err(map_cli_script_read)?;

    let lua = Lua::new();
    tw_host::install(&lua, Arc::clone(tweaker.context())).map_err(map_lua_error)?;
    info!(script = %args.script.display(), "running host script");
    lua.load(source.as_str())
        .set_name(args.script.display().to_string())
        .exec()
        .map_err(map_lua_error)?;

    println!("RESULT:OK");
    println!("STATUS:{}", tweaker.status());
    Ok(0)
}
