use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragx");
    path
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
dir = "{root}/data/index"

[corpus]
root = "{root}/documents"

[chunking]
chunk_size = 400
chunk_overlap = 50

[logging]
default = "warn"
{extra}"#,
        root = root.display(),
        extra = extra
    );

    let config_path = config_dir.join("ragx.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("documents");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        docs.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.",
    )
    .unwrap();

    let config_path = write_config(&root, "");
    (tmp, config_path)
}

fn run_ragx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_reset_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragx(&config_path, &["reset"]);
    assert!(success, "reset failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Index reset."));

    let (_, _, success) = run_ragx(&config_path, &["reset"]);
    assert!(success, "second reset failed (not idempotent)");
    assert!(!tmp.path().join("data/index/index.sqlite").exists());
    assert!(!tmp.path().join("data/index/ledger.json").exists());
}

#[test]
fn test_search_without_index_prints_no_results() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragx(&config_path, &["search", "cargo crates"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_json_without_index_is_empty_array() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragx(&config_path, &["search", "cargo", "--json"]);
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed, serde_json::json!([]));
}

#[test]
fn test_refresh_fails_when_embeddings_disabled() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ragx(&config_path, &["refresh", "--progress", "off"]);
    assert!(!success, "refresh should fail without an embedding provider");
    assert!(
        stderr.contains("embedding provider failure"),
        "unexpected stderr: {}",
        stderr
    );
    // Nothing is committed after a failed rebuild.
    assert!(!tmp.path().join("data/index/ledger.json").exists());
    assert!(!tmp.path().join("data/index/index.sqlite").exists());
}

#[test]
fn test_refresh_empty_corpus_fails() {
    let (tmp, config_path) = setup_test_env();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let (_, stderr, success) = run_ragx(
        &config_path,
        &["refresh", "--dir", empty.to_str().unwrap(), "--progress", "off"],
    );
    assert!(!success);
    assert!(stderr.contains("no documents found"), "stderr={}", stderr);
}

#[test]
fn test_refresh_missing_directory_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope");

    let (_, _, success) = run_ragx(
        &config_path,
        &["refresh", "--dir", missing.to_str().unwrap()],
    );
    assert!(!success);
}

#[test]
fn test_unknown_progress_mode() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ragx(&config_path, &["refresh", "--progress", "loud"]);
    assert!(!success);
    assert!(stderr.contains("Unknown progress mode"));
}

#[test]
fn test_invalid_chunking_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("chunk_overlap = 50", "chunk_overlap = 400");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_ragx(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr={}", stderr);
}

#[test]
fn test_unknown_provider_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "\n[embedding]\nprovider = \"carrier-pigeon\"\n");

    let (_, stderr, success) = run_ragx(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ragx(&tmp.path().join("absent.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_stats_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragx(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Index Stats"));
    assert!(stdout.contains("none (run `ragx refresh`)"));
    assert!(stdout.contains("Ledger:      0 files"));
}

#[test]
fn test_stats_json_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ragx(&config_path, &["stats", "--json"]);
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(parsed["artifact"].is_null());
    assert_eq!(parsed["ledger_files"], 0);
}

#[test]
fn test_corrupt_artifact_is_treated_as_missing() {
    let (tmp, config_path) = setup_test_env();
    let store = tmp.path().join("data/index");
    fs::create_dir_all(&store).unwrap();
    fs::write(store.join("index.sqlite"), b"definitely not sqlite").unwrap();

    let (stdout, stderr, success) = run_ragx(&config_path, &["search", "alpha"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_ragx(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("none (run `ragx refresh`)"));

    let (_, _, success) = run_ragx(&config_path, &["reset"]);
    assert!(success);
    assert!(!store.join("index.sqlite").exists());
}
