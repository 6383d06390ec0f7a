use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn run_with_config(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gatesync"))
        .args(args)
        .env("GATESYNC_CONFIG", config)
        .env_remove("RUST_LOG")
        .output()
        .expect("run gatesync")
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("gatesync.toml");
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn rejects_threshold_below_forty() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[source]
root_path = "/tmp"
directory_list = ["a"]

[destination]
username = "backup"
root_path = "/srv/backup"
host_list = [{ hostname = "127.0.0.1", os_kind = "posix" }]

[threshold]
percentage = 30
"#,
    );

    let output = run_with_config(&config, &["--dry-run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("threshold"), "stderr: {stderr}");
}

#[test]
fn rejects_ambiguous_direction() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[source]
username = "me"
root_path = "/tmp"
directory_list = ["a"]
host_list = [{ hostname = "left" }]

[destination]
username = "backup"
root_path = "/srv/backup"
host_list = [{ hostname = "right" }]

[threshold]
percentage = 85
"#,
    );

    let output = run_with_config(&config, &["--dry-run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("direction"), "stderr: {stderr}");
}

#[test]
fn missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_with_config(&dir.path().join("nowhere.toml"), &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nowhere.toml"), "stderr: {stderr}");
}

#[test]
fn unknown_flags_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let output = run_with_config(&config, &["--force"]);
    assert_eq!(output.status.code(), Some(2));
}
