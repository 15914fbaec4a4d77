//! End-to-end checks of the command line surface.
//!
//! On Windows an unelevated test runner would trigger a UAC prompt, so these only run where
//! there is no elevation step.
#![cfg(not(windows))]

use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fontinstaller"))
}

#[test]
fn wrong_argument_count_prints_usage_and_exits_1() {
    let dir = tempdir().unwrap();

    for args in [vec![], vec!["fonts"], vec!["a", "b", "c"]] {
        let output = bin().current_dir(dir.path()).args(&args).output().unwrap();

        assert_eq!(output.status.code(), Some(1), "args: {args:?}");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Usage"), "stderr for {args:?}:\n{stderr}");
    }

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn missing_source_folder_exits_1_without_marker() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("Variables.inc");

    let output = bin()
        .arg(dir.path().join("does-not-exist"))
        .arg(&marker)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid folder path"), "stderr:\n{stderr}");
    assert!(!marker.exists());
}

#[test]
fn source_must_be_a_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("font.ttf");
    fs::write(&file, b"x").unwrap();
    let marker = dir.path().join("Variables.inc");

    let output = bin().arg(&file).arg(&marker).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(!marker.exists());
}

#[test]
fn marker_is_written_even_when_install_cannot_run() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("fonts");
    fs::create_dir(&source).unwrap();
    let marker = dir.path().join("Variables.inc");
    fs::write(&marker, "stale").unwrap();

    let output = bin().arg(&source).arg(&marker).output().unwrap();

    // Sub-step failures are logged, never turned into an exit code.
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        fs::read_to_string(&marker).unwrap(),
        "[Variables]\nInstalled_Fonts=1\n"
    );
}

#[test]
fn strict_mode_reports_failed_install() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("Variables.inc");

    let output = bin()
        .arg(dir.path())
        .arg(&marker)
        .args(["--strict", "--no-restart"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(marker.exists());
}

#[test]
fn help_exits_0() {
    let output = bin().arg("--help").output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--fonts-only"));
}
