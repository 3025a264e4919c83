use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tw-cli")]
#[command(about = "Run mod tweak scripts against asset files")]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) config: ConfigArgs,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Args)]
pub(crate) struct ConfigArgs {
    #[arg(long = "config", global = true)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long = "mods-dir", global = true)]
    pub(crate) mods_dir: Option<PathBuf>,
    #[arg(long = "entry-module", global = true)]
    pub(crate) entry_module: Option<String>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    Tweak(TweakArgs),
    Hash(HashArgs),
    Lua(LuaArgs),
}

#[derive(Debug, Args)]
pub(crate) struct TweakArgs {
    #[arg(long = "name")]
    pub(crate) name: String,
    #[arg(long = "ext")]
    pub(crate) ext: String,
    #[arg(long = "input")]
    pub(crate) input: PathBuf,
    #[arg(long = "output")]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct HashArgs {
    #[arg(required = true)]
    pub(crate) texts: Vec<String>,
}

#[derive(Debug, Args)]
pub(crate) struct LuaArgs {
    #[arg(long = "script")]
    pub(crate) script: PathBuf,
}
