//! CLI tests against the built binary

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

use crate::helpers::setup_fake_render;

#[test]
fn help_lists_commands() {
    cargo_bin_cmd!("ropwatch")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn config_path_uses_home() {
    let home = TempDir::new().unwrap();
    let expected = home.path().join(".config").join("ropwatch").join("config.toml");

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().as_ref()));
}

#[test]
fn config_show_prints_defaults() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[monitor]"))
        .stdout(predicate::str::contains("grace_period_secs = 3"))
        .stdout(predicate::str::contains("/out/Redshift_ROP1"));
}

#[test]
fn config_reset_writes_file() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["config", "reset"])
        .assert()
        .success();

    let written = home.path().join(".config/ropwatch/config.toml");
    assert!(written.exists());
}

#[test]
fn invalid_config_is_reported() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config/ropwatch");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), "[monitor]\ngrace_period_secs = 0\n").unwrap();

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("grace_period_secs"));
}

#[test]
fn completions_generate_script() {
    cargo_bin_cmd!("ropwatch")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ropwatch"));
}

#[test]
fn render_without_scene_fails() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .arg("render")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--hip"));
}

#[cfg(unix)]
#[test]
fn render_streams_log_and_succeeds() {
    let home = TempDir::new().unwrap();
    setup_fake_render(
        home.path(),
        "echo \"args: $*\"\n\
         echo \"ROP '$4' render started for 2 frames\"\n\
         echo 'Rendering frame 1'\n\
         echo 'Rendering time: 1s'\n\
         echo 'Rendering frame 2'\n\
         echo 'Rendering time: 1s'\n",
    );

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["render", "--hip", "shot.hip", "--out", "/out/beauty"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "args: -i shot.hip -o /out/beauty -s 0 -e 100 -u False -m False",
        ))
        .stdout(predicate::str::contains("Rendering frame 2"))
        .stderr(predicate::str::contains("Render completed (2/2 frames"));
}

#[cfg(unix)]
#[test]
fn render_json_emits_tagged_events() {
    let home = TempDir::new().unwrap();
    setup_fake_render(home.path(), "echo 'Rendering frame 1'\necho 'Rendering time: 1s'\n");

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["render", "--hip", "shot.hip", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""event":"line""#))
        .stdout(predicate::str::contains(r#""event":"frame_started""#))
        .stdout(predicate::str::contains(r#""event":"finished""#))
        .stdout(predicate::str::contains(r#""state":"completed""#));
}

#[cfg(unix)]
#[test]
fn failed_render_exits_with_one() {
    let home = TempDir::new().unwrap();
    setup_fake_render(home.path(), "echo broken\nexit 4\n");

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["render", "--hip", "shot.hip"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("exit code 4"));
}

#[cfg(unix)]
#[test]
fn remember_stores_form_values() {
    let home = TempDir::new().unwrap();
    setup_fake_render(home.path(), "true\n");

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args([
            "render", "--hip", "/jobs/keep.hip", "--start", "5", "--end", "9", "--remember",
        ])
        .assert()
        .success();

    let saved = fs::read_to_string(home.path().join(".config/ropwatch/config.toml")).unwrap();
    assert!(saved.contains("/jobs/keep.hip"));
    assert!(saved.contains("start_frame = 5"));
    assert!(saved.contains("use_range = true"));
    assert!(saved.contains("hip_history = [\"/jobs/keep.hip\"]"));
    // Settings written by hand survive the rewrite.
    assert!(saved.contains("executable = \"sh\""));
}

#[test]
fn reset_form_clears_history_and_keeps_render_settings() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config/ropwatch");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "[render]\nexecutable = \"/opt/hfs/bin/hython\"\n\n\
         [defaults]\nhip_file = \"/jobs/a.hip\"\nmerge = true\n\
         hip_history = [\"/jobs/a.hip\", \"/jobs/b.hip\"]\n\
         out_history = [\"/out/rop1\"]\n",
    )
    .unwrap();

    cargo_bin_cmd!("ropwatch")
        .env("HOME", home.path())
        .args(["config", "reset-form"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared history"));

    let saved = fs::read_to_string(dir.join("config.toml")).unwrap();
    assert!(saved.contains("executable = \"/opt/hfs/bin/hython\""));
    assert!(!saved.contains("/jobs/a.hip"));
    assert!(!saved.contains("/out/rop1"));
    assert!(saved.contains("merge = false"));
}
