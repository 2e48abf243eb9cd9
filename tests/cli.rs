//! CLI tests against the compiled `scout` binary. None of these touch the
//! network: `plan` is offline and `rescore` reads the raw-item cache.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use repo_scout::cache::RawCache;
use repo_scout::{ContentItem, ContentType, ItemDetail};

fn scout_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // test binary name
    path.pop(); // deps/
    path.push("scout");
    path
}

fn write_config(root: &Path, body: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let content = format!(
        r#"repo = "acme/gpu"
{}

[cache]
dir = "{}/cache"
"#,
        body,
        root.display()
    );
    let path = config_dir.join("scout.toml");
    fs::write(&path, content).unwrap();
    path
}

const PAGE_FAULT_KEYWORDS: &str = r#"
[keywords]
high = ["page fault"]
medium = ["sigsegv"]
low = []
"#;

fn run_scout(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = scout_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run scout binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn issue(n: u64, title: &str, body: &str) -> ContentItem {
    ContentItem {
        title: title.into(),
        body: body.into(),
        comments: None,
        labels: BTreeSet::new(),
        state: "closed".into(),
        url: format!("https://github.com/acme/gpu/issues/{}", n),
        created_at: "2024-01-15T10:00:00Z".into(),
        detail: ItemDetail::Issue { number: n },
    }
}

fn seed_cache(root: &Path) {
    let mut cache = RawCache::open(&root.join("cache"), "acme/gpu");
    cache.put_section(
        ContentType::Issue,
        vec![
            issue(101, "Page fault in GEMM", "memory page fault then sigsegv"),
            issue(102, "Build warning", "unrelated"),
        ],
    );
    cache.save().unwrap();
}

#[test]
fn test_plan_page_fault_scenario() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), PAGE_FAULT_KEYWORDS);

    let (stdout, stderr, success) = run_scout(&config, &["plan"]);
    assert!(success, "plan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("2 queries planned"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[1].contains("[Q01] R1"));
    assert!(lines[1].ends_with("\"page fault\""));
    assert!(lines[2].contains("[Q02] R3"));
    assert!(lines[2].ends_with("sigsegv"));
    assert!(stdout.contains("more than 5"));
}

#[test]
fn test_plan_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(
        tmp.path(),
        r#"component = "hipblaslt"

[keywords]
high = ["page fault", "memory access fault", "gpu hang"]
medium = ["sigsegv", "illegal address", "xnack"]
low = ["crash", "gfx942", "rocm 6.2", "abort"]
"#,
    );
    let (first, _, ok1) = run_scout(&config, &["plan"]);
    let (second, _, ok2) = run_scout(&config, &["plan"]);
    assert!(ok1 && ok2);
    assert_eq!(first, second);
    assert!(first.contains("hipblaslt"));
}

#[test]
fn test_plan_without_keywords_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let (stdout, _, success) = run_scout(&config, &["plan"]);
    assert!(!success, "plan should fail with no keywords");
    assert!(!stdout.contains("queries planned"));
}

#[test]
fn test_unknown_search_type_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("scout.toml");
    fs::write(
        &config,
        r#"repo = "acme/gpu"
search_types = ["issues", "wiki"]

[keywords]
high = ["oom"]
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_scout(&config, &["plan"]);
    assert!(!success);
    assert!(stderr.contains("config"), "stderr={}", stderr);
}

#[test]
fn test_rescore_requires_cache() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), PAGE_FAULT_KEYWORDS);

    let (_, stderr, success) = run_scout(&config, &["rescore"]);
    assert!(!success);
    assert!(stderr.contains("No cached items"), "stderr={}", stderr);
}

#[test]
fn test_rescore_from_cache_with_overrides() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), PAGE_FAULT_KEYWORDS);
    seed_cache(tmp.path());

    let overrides = tmp.path().join("overrides.json");
    fs::write(
        &overrides,
        r#"{"overrides": {"issues": {"102": {"ai_score": 30.0, "ai_label": "relevant"}}}}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_scout(
        &config,
        &["rescore", "--overrides", overrides.to_str().unwrap()],
    );
    assert!(success, "rescore failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("== issues (2 searched, 2 relevant,"), "{}", stdout);
    assert!(stdout.contains("override: relevant"));
    assert!(stdout.contains("1 score overrides applied"));

    let build = stdout.find("Build warning").unwrap();
    let gemm = stdout.find("Page fault in GEMM").unwrap();
    assert!(build < gemm, "override should rank first:\n{}", stdout);
}

#[test]
fn test_rescore_min_score_hides_low_items() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), PAGE_FAULT_KEYWORDS);
    seed_cache(tmp.path());

    let (stdout, stderr, success) = run_scout(&config, &["rescore"]);
    assert!(success, "rescore failed: stderr={}", stderr);
    assert!(stdout.contains("(2 searched, 1 relevant"), "{}", stdout);
    assert!(stdout.contains("Page fault in GEMM"));
    assert!(!stdout.contains("Build warning"));

    let (stdout, _, success) = run_scout(&config, &["rescore", "--min-score", "0"]);
    assert!(success);
    assert!(stdout.contains("Build warning"));

    let (_, _, success) = run_scout(&config, &["rescore", "--min-score", "-2"]);
    assert!(!success);
}

#[test]
fn test_plan_with_appended_queries() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), PAGE_FAULT_KEYWORDS);

    let (stdout, stderr, success) = run_scout(
        &config,
        &["plan", "--append-queries", "hipMalloc oom", "sigsegv"],
    );
    assert!(success, "plan failed: stderr={}", stderr);
    assert!(stdout.starts_with("3 queries planned"), "{}", stdout);
    let last = stdout.lines().nth(3).unwrap();
    assert!(last.contains("[Q03] Extra"));
    assert!(last.ends_with("hipMalloc oom"));
}

#[test]
fn test_plan_with_only_appended_queries() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");

    let (stdout, _, success) = run_scout(&config, &["plan", "--append-queries", "gpu hang"]);
    assert!(success);
    assert!(stdout.starts_with("1 queries planned"));
}

#[test]
fn test_rescore_json_output() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), PAGE_FAULT_KEYWORDS);
    seed_cache(tmp.path());

    let (stdout, stderr, success) = run_scout(&config, &["rescore", "--json"]);
    assert!(success, "rescore failed: stderr={}", stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let issues = json["results"]["issues"].as_array().unwrap();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0]["item"]["detail"]["number"], 101);
    assert_eq!(json["overrides_applied"], 0);
}
