use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use clearview::models::ArtifactKind;
use clearview::store::{RecordStore, SqliteRecordStore};

fn clearview_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("clearview");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/clearview.sqlite"

[server]
bind = "127.0.0.1:7341"

[analysis]
aspects = ["summary", "scam", "subjectivity", "bias"]
bias_cutoff = 0.5
"#,
        root.display()
    );

    let config_path = config_dir.join("clearview.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data").join("clearview.sqlite")
}

fn run_clearview(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = clearview_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run clearview binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_clearview(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(db_path(&tmp).exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_clearview(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_clearview(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_get_unknown_id_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_clearview(&config_path, &["init"]);

    let (_, stderr, success) = run_clearview(
        &config_path,
        &["get", "report", "00000000-0000-4000-8000-000000000000"],
    );
    assert!(!success, "get of unknown id should fail");
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_get_rejects_unknown_kind() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_clearview(&config_path, &["get", "video", "abc"]);
    assert!(!success);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[analysis]\nbias_cutoff = 2.0\n").unwrap();

    let (_, stderr, success) = run_clearview(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("bias_cutoff"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_get_writes_stored_record() {
    let (tmp, config_path) = setup_test_env();

    let store = SqliteRecordStore::open(&db_path(&tmp)).await.unwrap();
    let id = store
        .put(ArtifactKind::Audio, "Morning Briefing", b"ID3audio-bytes")
        .await
        .unwrap();
    store.close().await;

    let out = tmp.path().join("out").join("briefing.mp3");
    let (stdout, stderr, success) = run_clearview(
        &config_path,
        &["get", "audio", &id, "--out", out.to_str().unwrap()],
    );
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("audio/mpeg"));
    assert_eq!(fs::read(&out).unwrap(), b"ID3audio-bytes");

    // The same id is not a report.
    let (_, _, success) = run_clearview(&config_path, &["get", "report", &id]);
    assert!(!success);
}
