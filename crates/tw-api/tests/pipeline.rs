use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;
use tw_api::{
    create_tweaker, create_tweaker_from_config_file, AssetInterceptor, Tweaker, TweakerOptions,
    TweakedBuffer,
};
use tw_core::{idstring_hash, idstring_hex, BridgeValue, HostArg, TweakConfig};
use tw_runtime::RuntimeStatus;

struct HookSwitch {
    enabled: AtomicBool,
}

impl HookSwitch {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl AssetInterceptor for HookSwitch {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

fn write_script(mods_dir: &Path, mod_id: &str, file: &str, source: &str) {
    let path = TweakConfig::with_mods_dir(mods_dir).script_path(mod_id, file);
    fs::create_dir_all(path.parent().expect("script dir")).expect("create script dir");
    fs::write(path, source).expect("write script");
}

fn weapon_mod() -> (TempDir, Tweaker) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mods_dir = dir.path().join("mods");
    let base = r#"
import "weapons/bridge" as bridge;

export const BaseTweaker = #{
    tweak: |name, ext, text| if name == "@NAME@" { text.replace("damage=\"10\"", "damage=\"40\""); text } else { text }
};
"#
    .replace("@NAME@", &idstring_hex("weapons/ak47"));
    write_script(&mods_dir, "base", "base", &base);
    write_script(
        &mods_dir,
        "weapons",
        "bridge",
        r#"
import "base/native/LuaInterface_001" as li;
li::LuaInterface::register_object("stats", #{ scale: |value, factor| value * factor });
"#,
    );
    let tweaker = create_tweaker(TweakerOptions {
        config: TweakConfig::with_mods_dir(mods_dir),
        plugins: None,
    });
    (dir, tweaker)
}

#[test]
fn load_asset_parses_tweaked_buffer_with_interception_suspended() {
    let (_dir, tweaker) = weapon_mod();
    let switch = HookSwitch::new();
    let data = br#"<weapon damage="10"/>"#;

    let parsed = tweaker
        .load_asset(
            &switch,
            idstring_hash("weapons/ak47"),
            idstring_hash("xml"),
            data,
            |bytes| {
                assert!(!switch.is_enabled());
                String::from_utf8(bytes.to_vec()).expect("utf-8 asset")
            },
        )
        .expect("load should pass");

    assert_eq!(parsed, r#"<weapon damage="40"/>"#);
    assert!(switch.is_enabled());
    assert_eq!(tweaker.status(), RuntimeStatus::Active);
}

#[test]
fn untouched_and_binary_assets_keep_their_buffer() {
    let (_dir, tweaker) = weapon_mod();
    let data = br#"<weapon damage="10"/>"#;
    let other = tweaker
        .tweak_buffer(idstring_hash("weapons/m4"), idstring_hash("xml"), data)
        .expect("tweak should pass");
    assert_eq!(other, TweakedBuffer::Original(data));

    let binary = [0xff_u8, 0xfe, 0x00, 0x01];
    let skipped = tweaker
        .tweak_buffer(idstring_hash("weapons/ak47"), idstring_hash("xml"), &binary)
        .expect("binary tweak should pass");
    assert_eq!(skipped.as_bytes(), &binary);
    assert!(!skipped.is_replaced());
}

#[test]
fn ignored_assets_skip_the_pipeline() {
    let (_dir, tweaker) = weapon_mod();
    let name = idstring_hash("weapons/ak47");
    let ext = idstring_hash("xml");
    tweaker.ignore_file(name, ext);
    let data = br#"<weapon damage="10"/>"#;
    let buffer = tweaker.tweak_buffer(name, ext, data).expect("tweak should pass");
    assert!(!buffer.is_replaced());
}

#[test]
fn host_invoke_goes_through_the_facade() {
    let (_dir, tweaker) = weapon_mod();
    let result = tweaker
        .invoke("weapons/stats", "scale", &[HostArg::Integer(6), HostArg::Integer(7)])
        .expect("invoke should pass");
    assert_eq!(result, BridgeValue::Integer(42));
}

#[test]
fn config_file_selects_mods_directory() {
    let (dir, _) = weapon_mod();
    let config_path = dir.path().join("tweaker.json");
    let mods_dir = dir.path().join("mods");
    let config = serde_json::json!({ "mods_dir": mods_dir });
    fs::write(&config_path, config.to_string()).expect("write config");

    let tweaker = create_tweaker_from_config_file(&config_path).expect("config should load");
    let buffer = tweaker
        .tweak_buffer(
            idstring_hash("weapons/ak47"),
            idstring_hash("xml"),
            br#"<weapon damage="10"/>"#,
        )
        .expect("tweak should pass");
    assert_eq!(buffer.as_bytes(), br#"<weapon damage="40"/>"#);

    let error = create_tweaker_from_config_file(&dir.path().join("missing.json"))
        .err()
        .expect("missing config should fail");
    assert_eq!(error.code, "CONFIG_READ");
}

