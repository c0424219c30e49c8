//! CLI integration tests for agent and admin credential management.

use predicates::prelude::*;

mod common;
use common::TestEnv;

#[test]
fn test_agent_create_and_list() {
    let env = TestEnv::new();

    env.ckb()
        .args(["agent", "create", "bot1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"bot1\""))
        .stdout(predicate::str::contains("api_key"));

    env.ckb()
        .args(["agent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bot1"));
}

#[test]
fn test_agent_duplicate_name_fails() {
    let env = TestEnv::new();

    env.ckb().args(["agent", "create", "bot1"]).assert().success();
    env.ckb()
        .args(["agent", "create", "bot1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bot1"));
}

#[test]
fn test_agent_rm() {
    let env = TestEnv::new();

    env.ckb().args(["agent", "create", "bot1"]).assert().success();
    env.ckb()
        .args(["agent", "rm", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted"));

    env.ckb()
        .args(["agent", "rm", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_admin_key_persists_until_rotated() {
    let env = TestEnv::new();

    let first = env.ckb().args(["admin", "show-key"]).output().unwrap();
    let second = env.ckb().args(["admin", "show-key"]).output().unwrap();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);

    let rotated = env.ckb().args(["admin", "rotate-key"]).output().unwrap();
    assert!(rotated.status.success());
    assert_ne!(first.stdout, rotated.stdout);

    let shown = env.ckb().args(["admin", "show-key"]).output().unwrap();
    assert_eq!(rotated.stdout, shown.stdout);
}

#[test]
fn test_mcp_manifest_lists_tools() {
    let env = TestEnv::new();

    env.ckb()
        .args(["mcp", "manifest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("session.open"))
        .stdout(predicate::str::contains("ticket.create"))
        .stdout(predicate::str::contains("comment.create"));
}
