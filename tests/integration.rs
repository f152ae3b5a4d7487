use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gtm_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gtm");
    path
}

/// Sources point at a closed local port so every fetch fails fast.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/gtm.sqlite"

[crawl]
timeout_secs = 2

[crawl.hn]
base_url = "http://127.0.0.1:9"
search_terms = ["edge computing", "data pipeline"]
page_delay_ms = 0
query_delay_ms = 0

[crawl.reddit]
base_url = "http://127.0.0.1:9"
subreddits = ["dataengineering"]
page_delay_ms = 0
query_delay_ms = 0

[analysis]
provider = "anthropic"
delay_ms = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("gtm.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gtm(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gtm_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "gtm_signals=warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gtm binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gtm(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/gtm.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_gtm(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_gtm(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_gtm(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("hn"));
    assert!(stdout.contains("reddit"));
    assert!(stdout.contains("OK"));
}

#[test]
fn test_stats_on_empty_archive() {
    let (_tmp, config_path) = setup_test_env();

    run_gtm(&config_path, &["init"]);
    let (stdout, stderr, success) = run_gtm(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Items:       0"));
    assert!(stdout.contains("Analyzed:    0 / 0 (0%)"));
}

#[test]
fn test_query_empty_json() {
    let (_tmp, config_path) = setup_test_env();

    run_gtm(&config_path, &["init"]);
    let (stdout, stderr, success) = run_gtm(&config_path, &["query", "--json"]);
    assert!(success, "query failed: {}", stderr);
    assert_eq!(stdout.trim(), "[]");
}

#[test]
fn test_query_rejects_out_of_range_threshold() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_gtm(&config_path, &["query", "--min-fit", "11"]);
    assert!(!success);
    assert!(stderr.contains("--min-fit"));
}

#[test]
fn test_digest_without_data() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gtm(&config_path, &["digest", "--no-save"]);
    assert!(success, "digest failed: {}", stderr);
    assert!(stdout.contains("# GTM Signal Digest"));
    assert!(stdout.contains("## Stats"));
    assert!(stdout.contains("No opportunities"));
}

#[test]
fn test_trends_without_data() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_gtm(&config_path, &["trends"]);
    assert!(success);
    assert!(stdout.contains("No trend data"));
}

#[test]
fn test_analyze_fails_fast_without_credentials() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gtm(&config_path, &["analyze"]);
    assert!(!success, "analyze should fail: stdout={}", stdout);
    assert!(stderr.contains("No API key"), "stderr={}", stderr);
}

#[test]
fn test_crawl_survives_unreachable_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_gtm(&config_path, &["crawl", "all", "--no-analyze"]);
    assert!(success, "crawl aborted: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("crawl hn"));
    assert!(stdout.contains("crawl reddit"));
    assert!(stdout.contains("new: 0"));
    // Two HN terms, one subreddit: each query fails on its first page.
    assert!(stdout.contains("failed queries: 2"));
    assert!(stdout.contains("failed queries: 1"));
}

#[test]
fn test_unknown_source() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_gtm(&config_path, &["crawl", "twitter", "--no-analyze"]);
    assert!(!success);
    assert!(stderr.contains("Unknown source"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[analysis]\nprovider = \"cohere\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_gtm(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown analysis provider"));
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_gtm(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
