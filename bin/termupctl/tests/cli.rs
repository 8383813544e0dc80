//! ---
//! termup_section: "05-networking-external-interfaces"
//! termup_subsection: "tests"
//! termup_type: "source"
//! termup_scope: "test"
//! termup_description: "Smoke tests for the termup operator CLI."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use assert_cmd::Command;

#[test]
fn help_lists_commands() {
    let output = Command::cargo_bin("termupctl")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["publish", "check", "manifest"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
}

#[test]
fn publish_fails_for_missing_package() {
    let output = Command::cargo_bin("termupctl")
        .unwrap()
        .args([
            "publish",
            "--server",
            "http://127.0.0.1:9",
            "--version",
            "1.0.0",
            "does-not-exist.zip",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unable to read package"), "stderr: {stderr}");
}
