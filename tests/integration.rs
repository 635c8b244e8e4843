use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn crag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crag");
    path
}

const MANIFEST: &str = r#"{
  "keywords": [
    {"id": "kw_lv", "name": "Louis Vuitton"},
    {"id": "kw_bags", "name": "Louis Vuitton Bags", "parent": "kw_lv"},
    {"id": "kw_press", "name": "LV Press", "parent": "kw_lv"},
    {"id": "kw_kusama", "name": "Yayoi Kusama"}
  ],
  "resources": [
    {"id": "bag1", "title": "Speedy 30", "url": "https://shop.example/speedy", "type": "shopping", "keywords": ["kw_bags"]},
    {"id": "bag2", "title": "Capucines MM", "url": "https://shop.example/capucines", "type": "shopping", "keywords": ["kw_bags"]},
    {"id": "news1", "title": "Runway recap", "url": "https://news.example/runway", "keywords": ["kw_press"]},
    {"id": "art1", "title": "Infinity dots", "url": "https://news.example/dots", "keywords": ["kw_kusama"]},
    {"id": "loose1", "title": "Untagged tote", "url": "https://shop.example/tote", "type": "shopping", "keywords": []}
  ],
  "talents": [
    {"id": "t1", "name": "Zendaya", "role": "Ambassador", "keywords": ["kw_lv"]}
  ]
}"#;

fn setup_test_env(embedding: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("campaign.json"), MANIFEST).unwrap();

    let config_content = format!(
        r#"[graph]
path = "{root}/data/graph.sqlite"

[index]
dir = "{root}/data/index"
kind = "ivf"
n_lists = 2
n_probe = 2
scope = "resources"

[embedding]
{embedding}

[llm]
provider = "demo"

[retrieval]
top_k = 5

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display(),
        embedding = embedding,
    );

    let config_path = config_dir.join("crag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

const HASH_EMBEDDING: &str = "provider = \"hash\"\ndims = 128";
const NO_EMBEDDING: &str = "provider = \"disabled\"";

fn run_crag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = crag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// init + import + index build against a fresh temp dir.
fn prepared(embedding: &str) -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env(embedding);
    let manifest = tmp.path().join("campaign.json");
    let manifest = manifest.to_str().unwrap();

    let (_, stderr, success) = run_crag(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (_, stderr, success) = run_crag(&config_path, &["import", manifest]);
    assert!(success, "import failed: {}", stderr);
    if embedding != NO_EMBEDDING {
        let (_, stderr, success) =
            run_crag(&config_path, &["index", "build", "--manifest", manifest]);
        assert!(success, "index build failed: {}", stderr);
    }
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(HASH_EMBEDDING);

    let (stdout, stderr, success) = run_crag(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/graph.sqlite").exists());

    // Idempotent
    let (_, _, success) = run_crag(&config_path, &["init"]);
    assert!(success);
}

#[test]
fn test_import_reports_counts() {
    let (tmp, config_path) = setup_test_env(HASH_EMBEDDING);
    run_crag(&config_path, &["init"]);

    let manifest = tmp.path().join("campaign.json");
    let (stdout, stderr, success) = run_crag(
        &config_path,
        &[
            "import",
            manifest.to_str().unwrap(),
            "--propagate-from",
            "kw_lv",
        ],
    );
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("Imported 4 keywords (0 placeholders), 5 resources, 1 talents"));
    // bag1 and bag2 each gain kw_lv and kw_press
    assert!(stdout.contains("Propagated 4 tags"), "{}", stdout);
}

#[test]
fn test_index_build_writes_artifacts() {
    let (tmp, _config_path) = prepared(HASH_EMBEDDING);
    let dir = tmp.path().join("data/index");

    let ids: Vec<String> =
        serde_json::from_str(&fs::read_to_string(dir.join("ids.json")).unwrap()).unwrap();
    assert_eq!(ids, vec!["bag1", "bag2", "news1", "art1", "loose1"]);
    let bytes = fs::read(dir.join("embeddings.f32")).unwrap();
    assert_eq!(bytes.len(), 5 * 128 * 4);
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("meta.json")).unwrap()).unwrap();
    assert_eq!(meta["dims"], 128);
}

#[test]
fn test_keywords_lists_hierarchy() {
    let (_tmp, config_path) = prepared(HASH_EMBEDDING);
    let (stdout, stderr, success) = run_crag(&config_path, &["keywords"]);
    assert!(success, "keywords failed: {}", stderr);
    assert!(stdout.contains("kw_bags"));
    assert!(stdout.contains("Yayoi Kusama"));
    assert!(stdout.contains("4 keywords, 5 resources, 1 talents"));
}

#[test]
fn test_scope_shows_hops() {
    let (_tmp, config_path) = prepared(HASH_EMBEDDING);
    let (stdout, stderr, success) = run_crag(&config_path, &["scope", "Louis Vuitton"]);
    assert!(success, "scope failed: {}", stderr);
    assert!(stdout.contains("Keywords in scope (3)"));
    assert!(stdout.contains("Resources in scope (3)"));
    assert!(stdout.contains("hops=1 Speedy 30"));
    assert!(!stdout.contains("Infinity dots"));
}

#[test]
fn test_ask_answers_within_scope() {
    let (_tmp, config_path) = prepared(HASH_EMBEDDING);
    let (stdout, stderr, success) = run_crag(
        &config_path,
        &["ask", "what lv bags are in the campaign?", "--types", "shopping"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.starts_with("Louis Vuitton is covered by 2 campaign pieces."), "{}", stdout);
    assert!(stdout.contains("https://shop.example/speedy"));
    assert!(stdout.contains("https://shop.example/capucines"));
    // Untagged resources never leak into answers
    assert!(!stdout.contains("https://shop.example/tote"));
    assert!(!stdout.contains("https://news.example/dots"));
}

#[test]
fn test_ask_json_output() {
    let (_tmp, config_path) = prepared(HASH_EMBEDDING);
    let (stdout, stderr, success) = run_crag(
        &config_path,
        &["ask", "louis vuitton runway", "--top-k", "2", "--json"],
    );
    assert!(success, "ask failed: {}", stderr);
    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let sources = out["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert!(out.get("refusal").is_none());
}

#[test]
fn test_ask_refuses_out_of_scope() {
    let (_tmp, config_path) = prepared(HASH_EMBEDDING);
    let refusal = "It is not associated with exclusive campaigns.";

    // No keyword resolves
    let (stdout, _, success) = run_crag(&config_path, &["ask", "what about gucci?"]);
    assert!(success);
    assert_eq!(stdout.trim(), refusal);

    // Disabled keyword
    let (stdout, _, success) = run_crag(
        &config_path,
        &["ask", "yayoi kusama dots", "--disabled", "Yayoi Kusama"],
    );
    assert!(success);
    assert_eq!(stdout.trim(), refusal);

    // Type filter empties the scope
    let (stdout, _, success) = run_crag(
        &config_path,
        &["ask", "louis vuitton", "--types", "hotel", "--json"],
    );
    assert!(success);
    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(out["answer"], refusal);
    assert_eq!(out["sources"].as_array().unwrap().len(), 0);
    assert_eq!(out["refusal"], "no_typed_resources");
}

#[test]
fn test_ask_featured_block_from_overflow() {
    let (_tmp, config_path) = prepared(HASH_EMBEDDING);
    let (stdout, stderr, success) = run_crag(
        &config_path,
        &["ask", "louis vuitton bags", "--types", "shopping", "--top-k", "1", "--json"],
    );
    assert!(success, "ask failed: {}", stderr);
    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let answer = out["answer"].as_str().unwrap();
    assert!(answer.contains("**Featured pieces**"), "{}", answer);
    // Featured URLs are not canonical sources
    assert_eq!(out["sources"].as_array().unwrap().len(), 1);
}

#[test]
fn test_ask_without_embeddings_uses_graph_prior() {
    let (_tmp, config_path) = prepared(NO_EMBEDDING);
    let (stdout, stderr, success) = run_crag(
        &config_path,
        &["ask", "louis vuitton", "--top-k", "1", "--json"],
    );
    assert!(success, "ask failed: {}", stderr);
    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    // Every in-scope resource sits one hop below the root; catalog order breaks the tie
    assert_eq!(out["sources"][0], "https://shop.example/speedy");
}

#[test]
fn test_ask_fails_on_missing_index() {
    let (_tmp, config_path) = setup_test_env(HASH_EMBEDDING);
    run_crag(&config_path, &["init"]);
    let (_, stderr, success) = run_crag(&config_path, &["ask", "louis vuitton"]);
    assert!(!success);
    assert!(stderr.contains("Missing index"), "{}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env("provider = \"bogus\"");
    let (_, stderr, success) = run_crag(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}
