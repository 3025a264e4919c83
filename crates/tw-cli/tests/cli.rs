use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;
use tw_core::{idstring_hex, TweakConfig};

const BASE: &str = r#"
import "weapons/ui" as ui;

export const BaseTweaker = #{
    tweak: |name, ext, text| if name == "@NAME@" { "<weapon damage=\"40\"/>" } else { text }
};
"#;

const UI: &str = r#"
import "base/native/LuaInterface_001" as li;
li::LuaInterface::register_object("hud", #{ greet: |who| "hello " + who });
"#;

fn write_script(mods_dir: &Path, mod_id: &str, file: &str, source: &str) {
    let path = TweakConfig::with_mods_dir(mods_dir).script_path(mod_id, file);
    fs::create_dir_all(path.parent().expect("script dir")).expect("create script dir");
    fs::write(path, source).expect("write script");
}

fn mod_tree() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let mods_dir = dir.path().join("mods");
    let base = BASE.replace("@NAME@", &idstring_hex("weapons/ak47"));
    write_script(&mods_dir, "base", "base", &base);
    write_script(&mods_dir, "weapons", "ui", UI);
    fs::write(dir.path().join("ak47.xml"), r#"<weapon damage="10"/>"#).expect("write asset");
    dir
}

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tw-cli"))
        .arg("--mods-dir")
        .arg(dir.join("mods"))
        .args(args)
        .output()
        .expect("cli should execute")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn tweak_prints_rewritten_asset() {
    let dir = mod_tree();
    let input = dir.path().join("ak47.xml");
    let output = run_cli(
        dir.path(),
        &[
            "tweak",
            "--name",
            "weapons/ak47",
            "--ext",
            "xml",
            "--input",
            input.to_str().expect("utf-8 path"),
        ],
    );
    assert!(output.status.success(), "{}", stdout(&output));

    let text = stdout(&output);
    assert!(text.contains("RESULT:OK"), "{}", text);
    assert!(text.contains("STATUS:active"), "{}", text);
    assert!(text.contains("CHANGED:true"), "{}", text);
    let expected = serde_json::to_string(r#"<weapon damage="40"/>"#).expect("json");
    assert!(text.contains(&format!("TEXT_JSON:{}", expected)), "{}", text);
}

#[test]
fn tweak_writes_output_file() {
    let dir = mod_tree();
    let input = dir.path().join("ak47.xml");
    let target = dir.path().join("out.xml");
    let output = run_cli(
        dir.path(),
        &[
            "tweak",
            "--name",
            "weapons/m4",
            "--ext",
            "xml",
            "--input",
            input.to_str().expect("utf-8 path"),
            "--output",
            target.to_str().expect("utf-8 path"),
        ],
    );
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("CHANGED:false"));
    assert_eq!(
        fs::read_to_string(&target).expect("output written"),
        r#"<weapon damage="10"/>"#
    );
}

#[test]
fn tweak_without_mods_is_disabled_passthrough() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("a.xml");
    fs::write(&input, "<a/>").expect("write asset");
    let output = run_cli(
        dir.path(),
        &["tweak", "--name", "a", "--ext", "xml", "--input", input.to_str().expect("utf-8 path")],
    );
    let text = stdout(&output);
    assert!(output.status.success(), "{}", text);
    assert!(text.contains("STATUS:disabled"), "{}", text);
    assert!(text.contains("CHANGED:false"), "{}", text);
}

#[test]
fn errors_are_reported_with_codes() {
    let dir = mod_tree();
    let missing = run_cli(
        dir.path(),
        &["tweak", "--name", "a", "--ext", "xml", "--input", "/definitely/missing.xml"],
    );
    assert_eq!(missing.status.code(), Some(1));
    let text = stdout(&missing);
    assert!(text.contains("RESULT:ERROR"), "{}", text);
    assert!(text.contains("ERROR_CODE:CLI_INPUT_READ"), "{}", text);

    write_script(&dir.path().join("mods"), "base", "base", "export const BaseTweaker = #{");
    let input = dir.path().join("ak47.xml");
    let broken = run_cli(
        dir.path(),
        &["tweak", "--name", "a", "--ext", "xml", "--input", input.to_str().expect("utf-8 path")],
    );
    assert_eq!(broken.status.code(), Some(1));
    assert!(stdout(&broken).contains("ERROR_CODE:RUNTIME_BOOTSTRAP_FAILED"));
}

#[test]
fn hash_prints_idstring_hashes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run_cli(dir.path(), &["hash", "xml", "weapons/ak47"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains(&format!("HASH:{}|xml", idstring_hex("xml"))), "{}", text);
    assert!(
        text.contains(&format!("HASH:{}|weapons/ak47", idstring_hex("weapons/ak47"))),
        "{}",
        text
    );
}

#[test]
fn lua_script_invokes_registered_objects() {
    let dir = mod_tree();
    let script = dir.path().join("host.lua");
    fs::write(
        &script,
        r#"
local greeting = tweaker.script_io.invoke("weapons/hud", nil, "greet", "player")
assert(greeting == "hello player", greeting)
local ok, err = pcall(tweaker.script_io.invoke, "weapons/hud", nil, "_private")
assert(not ok)
tweaker.script_io.update()
"#,
    )
    .expect("write lua script");

    let output = run_cli(dir.path(), &["lua", "--script", script.to_str().expect("utf-8 path")]);
    let text = stdout(&output);
    assert!(output.status.success(), "{}", text);
    assert!(text.contains("RESULT:OK"), "{}", text);
    assert!(text.contains("STATUS:active"), "{}", text);
}

#[test]
fn failing_lua_script_reports_error() {
    let dir = mod_tree();
    let script = dir.path().join("host.lua");
    fs::write(&script, r#"tweaker.script_io.invoke("weapons/nope", nil, "greet")"#)
        .expect("write lua script");
    let output = run_cli(dir.path(), &["lua", "--script", script.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("ERROR_CODE:CLI_LUA_FAILED"));
}
