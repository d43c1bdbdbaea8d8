use std::fs;
use std::process::Command;

use tempfile::TempDir;

#[test]
fn list_prints_every_demo() {
    let output = Command::new(env!("CARGO_BIN_EXE_gputour"))
        .arg("list")
        .output()
        .expect("failed to run gputour list");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in [
        "triangle",
        "resize",
        "uniform-color",
        "vertex-slot",
        "textured-quad",
        "animated-quad",
        "cube",
        "textured-cube",
    ] {
        assert!(stdout.contains(name), "list output is missing {name}");
    }
}

#[test]
fn unknown_demo_names_fail_fast() {
    let output = Command::new(env!("CARGO_BIN_EXE_gputour"))
        .arg("teapot")
        .output()
        .expect("failed to run gputour");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown demo"), "stderr was: {stderr}");
}

#[test]
fn broken_defaults_files_fail_before_any_window_opens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("defaults.toml");
    fs::write(&path, "[demos.teapot]\nsize = \"1x1\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_gputour"))
        .args(["cube", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run gputour");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown demo"), "stderr was: {stderr}");
}
