use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use personal_crm::config::load_config;
use personal_crm::contacts::{create_contact, get_contact, ContactInput};
use personal_crm::db;
use personal_crm::graph::{create_edge, EdgeInput};
use personal_crm::statuses::list_statuses;
use crm_core::lookup::LookupRef;

fn crm_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crm");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/crm.sqlite"

[server]
bind = "127.0.0.1:7332"

[storage]
photos_dir = "{root}/data/photos"

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("crm.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crm(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = crm_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crm binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Seed three contacts in "New" and return (contact ids, id of "Active").
fn seed_board(config_path: &Path) -> (Vec<String>, String) {
    let config = load_config(config_path).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let pool = db::connect(&config).await.unwrap();
        let statuses = list_statuses(&pool, true).await.unwrap();
        let status_id = |name: &str| {
            statuses
                .iter()
                .find(|s| s.name == name)
                .map(|s| s.id.clone())
                .unwrap()
        };

        let mut ids = Vec::new();
        for name in ["Ann", "Bob", "Cat"] {
            let input = ContactInput {
                first_name: name.to_string(),
                status: Some(LookupRef::Existing(status_id("New"))),
                ..Default::default()
            };
            ids.push(create_contact(&pool, &input).await.unwrap().id);
        }
        pool.close().await;
        (ids, status_id("Active"))
    })
}

fn position_of(config_path: &Path, contact_id: &str) -> (Option<String>, i64) {
    let config = load_config(config_path).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let pool = db::connect(&config).await.unwrap();
        let contact = get_contact(&pool, contact_id).await.unwrap();
        pool.close().await;
        (contact.status_id, contact.sort_order_in_status)
    })
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_crm(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_crm(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");

    // Seeding must not repeat.
    let (stdout, _, _) = run_crm(&config_path, &["statuses"]);
    assert_eq!(stdout.matches("Archived").count(), 1);
}

#[test]
fn test_statuses_lists_default_columns() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);

    let (stdout, stderr, success) = run_crm(&config_path, &["statuses"]);
    assert!(success, "statuses failed: {}", stderr);
    let new = stdout.find("New").unwrap();
    let active = stdout.find("Active").unwrap();
    let archived = stdout.find("Archived").unwrap();
    assert!(new < active && active < archived);
}

#[test]
fn test_move_via_cli() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);
    let (ids, active) = seed_board(&config_path);

    let (stdout, stderr, success) = run_crm(&config_path, &["move", &ids[0], &active, "7"]);
    assert!(success, "move failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("position 0"));

    assert_eq!(position_of(&config_path, &ids[0]), (Some(active), 0));
    assert_eq!(position_of(&config_path, &ids[1]).1, 0);
    assert_eq!(position_of(&config_path, &ids[2]).1, 1);
}

#[test]
fn test_move_unknown_contact_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);
    let (_, active) = seed_board(&config_path);

    let (_, stderr, success) = run_crm(&config_path, &["move", "nobody", &active, "0"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[test]
fn test_clusters_via_cli() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);
    let (ids, _) = seed_board(&config_path);

    let config = load_config(&config_path).unwrap();
    tokio::runtime::Runtime::new().unwrap().block_on(async {
        let pool = db::connect(&config).await.unwrap();
        let edge = EdgeInput {
            source_id: ids[0].clone(),
            target_id: ids[1].clone(),
            label: None,
        };
        create_edge(&pool, &edge).await.unwrap();
        pool.close().await;
    });

    let (stdout, stderr, success) = run_crm(&config_path, &["clusters"]);
    assert!(success, "clusters failed: {}", stderr);
    assert!(stdout.contains("Found 2 clusters across 3 contacts"));
}

#[test]
fn test_move_negative_position_reports_domain_error() {
    let (_tmp, config_path) = setup_test_env();
    run_crm(&config_path, &["init"]);
    let (ids, active) = seed_board(&config_path);

    let (_, stderr, success) = run_crm(&config_path, &["move", &ids[0], &active, "-1"]);
    assert!(!success);
    assert!(stderr.contains("position must be >= 0"), "stderr={}", stderr);
}
