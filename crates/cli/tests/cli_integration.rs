//! CLI integration tests for the offline subcommands.
//!
//! Uses `assert_cmd` to spawn the `atolye` binary and verify
//! exit codes, stdout content, and stderr content.
//!
//! All tests set `current_dir` to the workspace root so that relative
//! paths to test fixtures resolve correctly.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use atolye_core::Decimal;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FIXTURE: &str = "crates/cli/tests/fixtures/workshop.json";

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `atolye` binary, rooted at workspace.
fn atolye() -> Command {
    let mut cmd = cargo_bin_cmd!("atolye");
    cmd.current_dir(workspace_root());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_ledger(dir: &TempDir, json: &serde_json::Value) -> PathBuf {
    let path = dir.path().join("ledger.json");
    fs::write(&path, serde_json::to_string_pretty(json).unwrap()).unwrap();
    path
}

fn dec(value: &serde_json::Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"))
        .parse()
        .unwrap()
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    atolye()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Gold workshop ledger toolchain"));
}

#[test]
fn version_exits_0() {
    atolye()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("atolye"));
}

#[test]
fn no_subcommand_exits_nonzero() {
    atolye().assert().failure();
}

// ──────────────────────────────────────────────
// 2. Summarize
// ──────────────────────────────────────────────

#[test]
fn summarize_fixture_text() {
    atolye()
        .args(["summarize", FIXTURE])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Kasa (kasa, storage): stock 50 g, has 37.5 g",
        ))
        .stdout(predicate::str::contains(
            "Yarı Mamul (yarimamul, semi_finished): stock 30 g, has 22.5 g",
        ))
        .stdout(predicate::str::contains(
            "Lazer Kesim (lazer-kesim, processing_fire): fire 2 g",
        ))
        .stdout(predicate::str::contains(
            "Tezgah (tezgah, processing_fire): fire 18 g",
        ))
        .stdout(predicate::str::contains("External vault: stock 11 g"))
        .stdout(predicate::str::contains("Skipped 1 malformed record(s)"));
}

#[test]
fn summarize_warns_about_undecodable_record() {
    atolye()
        .args(["summarize", FIXTURE])
        .assert()
        .success()
        .stderr(predicate::str::contains("tr-bad"));
}

#[test]
fn summarize_fixture_json() {
    let output = atolye()
        .args(["--output", "json", "summarize", FIXTURE])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let units = &json["units"];
    assert_eq!(dec(&units["kasa"]["total_stock"]), Decimal::from(50));
    assert_eq!(dec(&units["kasa"]["has_equivalent"]), "37.5".parse().unwrap());
    assert_eq!(dec(&units["yarimamul"]["total_stock"]), Decimal::from(30));
    assert_eq!(dec(&units["lazer-kesim"]["total_fire"]), Decimal::from(2));
    assert_eq!(dec(&units["lazer-kesim"]["total_stock"]), Decimal::ZERO);
    assert_eq!(dec(&units["tezgah"]["total_fire"]), Decimal::from(18));
    assert_eq!(json["skipped_records"], 1);
    assert_eq!(json["vault"]["counterparties"]["Kuyumcu Ali"]["transaction_count"], 2);
}

#[test]
fn summarize_single_unit() {
    atolye()
        .args(["summarize", FIXTURE, "--unit", "lazer-kesim"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "Lazer Kesim (lazer-kesim, processing_fire): fire 2 g\n",
        ))
        .stdout(predicate::str::contains("  18K: fire 2 g"))
        .stdout(predicate::str::contains("Kasa").not());
}

#[test]
fn summarize_unknown_unit_is_usage_error() {
    atolye()
        .args(["summarize", FIXTURE, "--unit", "mutfak"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown unit 'mutfak'"));
}

#[test]
fn summarize_missing_file_exits_1() {
    atolye()
        .args(["summarize", "does/not/exist.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error reading file"));
}

#[test]
fn summarize_non_ledger_document_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(&dir, &serde_json::json!(["not", "a", "ledger"]));
    atolye()
        .arg("summarize")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected a JSON object"));
}

#[test]
fn summarize_error_json_format() {
    let output = atolye()
        .args(["--output", "json", "summarize", "does/not/exist.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert!(err["error"].as_str().unwrap().contains("does/not/exist.json"));
}

#[test]
fn quiet_suppresses_errors() {
    atolye()
        .args(["--quiet", "summarize", "does/not/exist.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::is_empty());
}

#[test]
fn summarize_is_deterministic() {
    let first = atolye()
        .args(["--output", "json", "summarize", FIXTURE])
        .output()
        .unwrap();
    let second = atolye()
        .args(["--output", "json", "summarize", FIXTURE])
        .output()
        .unwrap();
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn summarize_clamps_negative_balance() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(
        &dir,
        &serde_json::json!({
            "transfers": [
                {"id": "t1", "from_unit": "kasa", "to_unit": "cila", "amount_grams": "5", "karat": 14, "created_at": "2026-01-01T00:00:00Z"}
            ]
        }),
    );
    atolye()
        .args(["summarize", "--unit", "kasa"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("stock 0 g, has 0 g"));
}

// ──────────────────────────────────────────────
// 3. Audit
// ──────────────────────────────────────────────

#[test]
fn audit_clean_fixture() {
    atolye()
        .args(["audit", FIXTURE])
        .assert()
        .success()
        .stdout("No integrity warnings\n");
}

#[test]
fn audit_reports_deficit() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(
        &dir,
        &serde_json::json!({
            "transfers": [
                {"id": "t1", "from_unit": "tedarik", "to_unit": "kasa", "amount_grams": "2", "karat": 18, "created_at": "2026-01-01T00:00:00Z"},
                {"id": "t2", "from_unit": "kasa", "to_unit": "cila", "amount_grams": "5", "karat": 18, "created_at": "2026-01-01T01:00:00Z"}
            ]
        }),
    );
    atolye()
        .arg("audit")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "kasa 18K: output 5 g exceeds input 2 g by 3 g",
        ));
}

#[test]
fn audit_json_lists_warnings() {
    let dir = TempDir::new().unwrap();
    let path = write_ledger(
        &dir,
        &serde_json::json!({
            "vault": [
                {"id": "v1", "direction": "withdrawal", "amount_grams": "4", "karat": 24, "created_at": "2026-01-01T00:00:00Z"}
            ]
        }),
    );
    let output = atolye()
        .args(["--output", "json", "audit"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let warnings = json["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["scope"]["kind"], "external_vault");
    assert_eq!(dec(&warnings[0]["deficit"]), Decimal::from(4));
}

// ──────────────────────────────────────────────
// 4. Statement
// ──────────────────────────────────────────────

#[test]
fn statement_matches_trimmed_counterparty() {
    atolye()
        .args(["statement", FIXTURE, "  Kuyumcu Ali "])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "Statement for Kuyumcu Ali (2 transaction(s))\n",
        ))
        .stdout(predicate::str::contains("vt-1"))
        .stdout(predicate::str::contains("vt-2"))
        .stdout(predicate::str::contains("vt-3").not());
}

#[test]
fn statement_json_is_oldest_first() {
    let output = atolye()
        .args(["--output", "json", "statement", FIXTURE, "Kuyumcu Ali"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let lines = json["lines"].as_array().unwrap();
    let ids: Vec<&str> = lines.iter().map(|l| l["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["vt-1", "vt-2"]);
    assert!(dec(&lines[1]["signed_has"]) < Decimal::ZERO);
    assert!(dec(&lines[1]["running_has"]) < dec(&lines[0]["running_has"]));
}

#[test]
fn statement_unknown_counterparty_is_empty() {
    atolye()
        .args(["statement", FIXTURE, "Nobody"])
        .assert()
        .success()
        .stdout("Statement for Nobody (0 transaction(s))\n");
}

// ──────────────────────────────────────────────
// 5. Mutations: local validation and config
// ──────────────────────────────────────────────

#[test]
fn transfer_same_unit_rejected_before_network() {
    atolye()
        .args([
            "transfer", "--from", "kasa", "--to", "kasa", "--grams", "5", "--karat", "18",
        ])
        .env("ATOLYE_STORE_URL", "http://127.0.0.1:9")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "rejected: transfer source and destination are both 'kasa'",
        ));
}

#[test]
fn transfer_zero_grams_rejected() {
    atolye()
        .args([
            "transfer", "--from", "kasa", "--to", "cila", "--grams", "0", "--karat", "18",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("amount must be positive"));
}

#[test]
fn transfer_oversized_grams_rejected_before_network() {
    atolye()
        .args([
            "transfer", "--from", "tedarik", "--to", "kasa", "--grams", "1000000001", "--karat",
            "18",
        ])
        .env("ATOLYE_STORE_URL", "http://127.0.0.1:9")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "rejected: amount 1000000001 g exceeds the 1000000000 g limit",
        ));
}

#[test]
fn summarize_skips_oversized_records() {
    let dir = TempDir::new().unwrap();
    let huge = "50000000000000000000000000000";
    let path = write_ledger(
        &dir,
        &serde_json::json!({
            "transfers": [
                {"id": "a", "from_unit": "tedarik", "to_unit": "kasa", "amount_grams": huge,
                 "karat": 18, "created_at": "2026-03-02T08:00:00Z"},
                {"id": "b", "from_unit": "tedarik", "to_unit": "kasa", "amount_grams": huge,
                 "karat": 18, "created_at": "2026-03-02T08:01:00Z"},
                {"id": "c", "from_unit": "kasa", "to_unit": "cila", "amount_grams": "1",
                 "karat": 14, "created_at": "2026-03-02T08:02:00Z"}
            ],
            "vault": []
        }),
    );

    let output = atolye()
        .args(["--output", "json", "summarize"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["skipped_records"], 2);
    assert_eq!(dec(&json["units"]["cila"]["total_fire"]), Decimal::ONE);
    assert_eq!(dec(&json["units"]["kasa"]["total_stock"]), Decimal::ZERO);
}

#[test]
fn transfer_unknown_karat_is_usage_error() {
    atolye()
        .args([
            "transfer", "--from", "kasa", "--to", "cila", "--grams", "5", "--karat", "19",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown karat '19'"));
}

#[test]
fn transfer_bad_config_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("atolye.toml");
    fs::write(&config, "poll_interval_ms = \"often\"\n").unwrap();
    atolye()
        .args(["--config"])
        .arg(&config)
        .args([
            "transfer", "--from", "kasa", "--to", "cila", "--grams", "5", "--karat", "18",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn transfer_unreachable_store_exits_1() {
    atolye()
        .args([
            "transfer", "--from", "kasa", "--to", "cila", "--grams", "5", "--karat", "18",
        ])
        .env("ATOLYE_STORE_URL", "http://127.0.0.1:9")
        .env("ATOLYE_REQUEST_TIMEOUT_MS", "2000")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("retry later"));
}
