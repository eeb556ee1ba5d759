//! Integration tests for the `atolye serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests (raw, through `HttpStore`, or through the `atolye`
//! client subcommands), and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atolye_core::{
    Decimal, Karat, NewTransfer, NewVaultTransaction, RecordId, TransferEvent, UnitId,
    VaultTransaction,
};
use atolye_storage::conformance::run_conformance_suite;
use atolye_storage::{LedgerStore, PushEvent, PushRecv, PushSubscription, StoreError};
use atolye_sync::{HttpStore, SyncCoordinator, SyncState};

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so parallel `cargo test --workspace` runs
/// (which spawn separate test binaries) don't collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

const FIXTURE: &str = "crates/cli/tests/fixtures/workshop.json";

/// A running `atolye serve` child, killed on drop.
struct Server {
    child: Child,
    port: u16,
}

impl Server {
    fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Helper: start the atolye serve process on a fresh port.
fn start_server(seed: Option<&str>, api_key: Option<&str>) -> Server {
    let port = next_port();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_atolye"));
    cmd.current_dir(workspace_root());
    cmd.arg("serve").arg("--port").arg(port.to_string());
    if let Some(seed) = seed {
        cmd.arg("--seed").arg(seed);
    }
    cmd.env_remove("ATOLYE_API_KEY");
    if let Some(key) = api_key {
        cmd.env("ATOLYE_API_KEY", key);
    }
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().expect("failed to start atolye serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server { child, port }
}

/// Helper: run an `atolye` client subcommand against `server`.
fn atolye_client(server: &Server, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_atolye"))
        .current_dir(workspace_root())
        .args(args)
        .env("ATOLYE_STORE_URL", server.url())
        .env("ATOLYE_REQUEST_TIMEOUT_MS", "5000")
        .env_remove("ATOLYE_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run atolye")
}

/// Helper: make a raw HTTP request and return (status, body).
fn http_request(
    port: u16,
    method: &str,
    path: &str,
    body: Option<&str>,
    extra_headers: &[(&str, &str)],
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in extra_headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let body = body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        method,
        path,
        port,
        body.len(),
        header_lines,
        body
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response(&response)
}

fn http_get(port: u16, path: &str) -> (u16, String) {
    http_request(port, "GET", path, None, &[])
}

fn http_post(port: u16, path: &str, body: &str) -> (u16, String) {
    http_request(port, "POST", path, Some(body), &[])
}

fn http_delete(port: u16, path: &str) -> (u16, String) {
    http_request(port, "DELETE", path, None, &[])
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = headers
        .to_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked { decode_chunked(&body) } else { body };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = (chunk_start + size).min(remaining.len());
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("invalid JSON ({e}): {body}"))
}

fn dec(value: &serde_json::Value) -> Decimal {
    value.as_str().expect("decimal string").parse().unwrap()
}

// ──────────────────────────────────────────────
// 1. Raw HTTP API
// ──────────────────────────────────────────────

#[test]
fn health_returns_200() {
    let server = start_server(None, None);
    let (status, body) = http_get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "ok");
}

#[test]
fn unknown_route_returns_404_json() {
    let server = start_server(None, None);
    let (status, body) = http_get(server.port, "/contracts");
    assert_eq!(status, 404);
    assert_eq!(json(&body)["error"], "not found");
}

#[test]
fn seeded_server_lists_decodable_records() {
    let server = start_server(Some(FIXTURE), None);

    let (status, body) = http_get(server.port, "/transfers");
    assert_eq!(status, 200);
    let ids: Vec<String> = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["tr-1", "tr-2", "tr-3", "tr-4", "tr-5"]);

    let (status, body) = http_get(server.port, "/vault");
    assert_eq!(status, 200);
    assert_eq!(json(&body).as_array().unwrap().len(), 3);
}

#[test]
fn summary_and_audit_views() {
    let server = start_server(Some(FIXTURE), None);

    let (status, body) = http_get(server.port, "/summary");
    assert_eq!(status, 200);
    let summary = json(&body);
    assert_eq!(dec(&summary["units"]["kasa"]["total_stock"]), Decimal::from(50));
    assert_eq!(dec(&summary["units"]["tezgah"]["total_fire"]), Decimal::from(18));

    let (status, body) = http_get(server.port, "/audit");
    assert_eq!(status, 200);
    assert!(json(&body)["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn create_and_delete_transfer() {
    let server = start_server(None, None);

    let (status, body) = http_post(
        server.port,
        "/transfers",
        r#"{"from_unit": "kasa", "to_unit": "cila", "amount_grams": "12.5", "karat": 22}"#,
    );
    assert_eq!(status, 201, "body: {body}");
    let id = json(&body)["id"].as_str().unwrap().to_string();

    let (_, body) = http_get(server.port, "/transfers");
    let listed = json(&body);
    assert_eq!(listed[0]["id"], id.as_str());
    assert_eq!(listed[0]["karat"], 22);
    assert!(!listed[0]["created_at"].as_str().unwrap().is_empty());

    let (status, _) = http_delete(server.port, &format!("/transfers/{id}"));
    assert_eq!(status, 204);
    // Idempotent.
    let (status, _) = http_delete(server.port, &format!("/transfers/{id}"));
    assert_eq!(status, 204);

    let (_, body) = http_get(server.port, "/transfers");
    assert!(json(&body).as_array().unwrap().is_empty());
}

#[test]
fn same_unit_transfer_is_422_with_validation() {
    let server = start_server(None, None);
    let (status, body) = http_post(
        server.port,
        "/transfers",
        r#"{"from_unit": "tezgah", "to_unit": "tezgah", "amount_grams": "1", "karat": 14}"#,
    );
    assert_eq!(status, 422);
    let body = json(&body);
    assert_eq!(body["validation"]["kind"], "same_unit");
    assert_eq!(body["validation"]["unit"], "tezgah");
    assert!(body["error"].as_str().unwrap().contains("tezgah"));
}

#[test]
fn zero_amount_vault_transaction_is_422() {
    let server = start_server(None, None);
    let (status, body) = http_post(
        server.port,
        "/vault",
        r#"{"direction": "deposit", "amount_grams": "0", "karat": 24}"#,
    );
    assert_eq!(status, 422);
    assert_eq!(json(&body)["validation"]["kind"], "non_positive_amount");
}

#[test]
fn unparseable_body_is_400() {
    let server = start_server(None, None);
    let (status, body) = http_post(server.port, "/transfers", r#"{"from_unit": "kasa""#);
    assert_eq!(status, 400);
    assert!(json(&body)["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));

    let (status, _) = http_post(
        server.port,
        "/transfers",
        r#"{"from_unit": "kasa", "to_unit": "cila", "amount_grams": "1", "karat": 19}"#,
    );
    assert_eq!(status, 400);
}

// ──────────────────────────────────────────────
// 2. Authentication
// ──────────────────────────────────────────────

#[test]
fn api_key_required_when_configured() {
    let server = start_server(None, Some("s3cret"));

    let (status, _) = http_get(server.port, "/health");
    assert_eq!(status, 200);

    let (status, body) = http_get(server.port, "/transfers");
    assert_eq!(status, 401);
    assert_eq!(json(&body)["error"], "missing or invalid API key");

    let (status, _) = http_request(
        server.port,
        "GET",
        "/transfers",
        None,
        &[("Authorization", "Bearer wrong")],
    );
    assert_eq!(status, 401);

    let (status, _) = http_request(
        server.port,
        "GET",
        "/transfers",
        None,
        &[("Authorization", "Bearer s3cret")],
    );
    assert_eq!(status, 200);

    let (status, _) = http_get(server.port, "/events");
    assert_eq!(status, 401);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_channel_requires_the_key() {
    let server = tokio::task::spawn_blocking(|| start_server(None, Some("s3cret")))
        .await
        .unwrap();
    let anonymous = HttpStore::new(&server.url(), None, Duration::from_secs(5));
    assert!(anonymous.subscribe().await.is_none());

    let keyed = HttpStore::new(&server.url(), Some("s3cret".into()), Duration::from_secs(5));
    let mut sub = keyed.subscribe().await.expect("push channel");
    let id = keyed
        .create_transfer(NewTransfer::new(
            UnitId::Kasa,
            UnitId::Tezgah,
            "2".parse().unwrap(),
            Karat::K14,
        ))
        .await
        .unwrap();
    match tokio::time::timeout(Duration::from_secs(5), sub.recv()).await {
        Ok(PushRecv::Event(PushEvent::TransferCreated { event })) => assert_eq!(event.id, id),
        other => panic!("expected transfer.created, got {other:?}"),
    }
}

// ──────────────────────────────────────────────
// 3. HttpStore against the server
// ──────────────────────────────────────────────

/// `HttpStore` bound to its own server process.
struct ServedStore {
    http: HttpStore,
    _server: Server,
}

#[async_trait]
impl LedgerStore for ServedStore {
    async fn list_transfers(&self) -> Result<Vec<TransferEvent>, StoreError> {
        self.http.list_transfers().await
    }

    async fn create_transfer(&self, transfer: NewTransfer) -> Result<RecordId, StoreError> {
        self.http.create_transfer(transfer).await
    }

    async fn delete_transfer(&self, id: &str) -> Result<(), StoreError> {
        self.http.delete_transfer(id).await
    }

    async fn list_vault_transactions(&self) -> Result<Vec<VaultTransaction>, StoreError> {
        self.http.list_vault_transactions().await
    }

    async fn create_vault_transaction(
        &self,
        transaction: NewVaultTransaction,
    ) -> Result<RecordId, StoreError> {
        self.http.create_vault_transaction(transaction).await
    }

    async fn delete_vault_transaction(&self, id: &str) -> Result<(), StoreError> {
        self.http.delete_vault_transaction(id).await
    }

    async fn subscribe(&self) -> Option<PushSubscription> {
        self.http.subscribe().await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_store_passes_conformance_suite() {
    let report = run_conformance_suite(|| async {
        let server = tokio::task::spawn_blocking(|| start_server(None, None))
            .await
            .unwrap();
        ServedStore {
            http: HttpStore::new(&server.url(), None, Duration::from_secs(5)),
            _server: server,
        }
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn coordinator_over_http_reconciles() {
    let server = tokio::task::spawn_blocking(|| start_server(Some(FIXTURE), None))
        .await
        .unwrap();
    let store = Arc::new(HttpStore::new(&server.url(), None, Duration::from_secs(5)));
    let coordinator =
        SyncCoordinator::with_timing(store, Duration::from_millis(200), Duration::from_secs(5));

    coordinator.refresh().await.unwrap();
    assert_eq!(coordinator.snapshot().ledger.transfers.len(), 5);

    let outcome = coordinator
        .create_transfer(NewTransfer::new(
            UnitId::Kasa,
            UnitId::Cila,
            "10".parse().unwrap(),
            Karat::K18,
        ))
        .await
        .unwrap();
    assert!(outcome.reconciled);
    assert!(!outcome.conflict);

    let state = coordinator.snapshot();
    assert!(state.ledger.contains_transfer(&outcome.id));
    assert_eq!(
        state.summary.unit(UnitId::Kasa).unwrap().total_stock,
        Decimal::from(40)
    );
    assert_eq!(
        state.summary.unit(UnitId::Cila).unwrap().total_fire,
        Decimal::from(10)
    );

    let err = coordinator
        .create_transfer(NewTransfer::new(
            UnitId::Satis,
            UnitId::Kasa,
            "1".parse().unwrap(),
            Karat::K18,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, atolye_sync::SyncError::Validation(_)));
    assert_eq!(coordinator.snapshot().ledger, state.ledger);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_reaches_records_with_unusual_ids() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.json");
    std::fs::write(
        &seed,
        serde_json::json!({
            "transfers": [{
                "id": "tr/7?x#1", "from_unit": "kasa", "to_unit": "cila",
                "amount_grams": "1", "karat": 18, "created_at": "2026-03-02T08:00:00Z"
            }],
            "vault": [{
                "id": "vt 2%", "direction": "deposit", "amount_grams": "1",
                "karat": 24, "created_at": "2026-03-02T08:00:00Z"
            }]
        })
        .to_string(),
    )
    .unwrap();
    let seed_arg = seed.to_string_lossy().into_owned();
    let server = tokio::task::spawn_blocking(move || start_server(Some(&seed_arg), None))
        .await
        .unwrap();
    let store = HttpStore::new(&server.url(), None, Duration::from_secs(5));

    store.delete_transfer("tr/7?x#1").await.unwrap();
    store.delete_vault_transaction("vt 2%").await.unwrap();

    let ledger = store.fetch_ledger().await.unwrap();
    assert!(ledger.transfers.is_empty(), "{:?}", ledger.transfers);
    assert!(ledger.vault.is_empty(), "{:?}", ledger.vault);
}

async fn wait_for_state(
    rx: &mut tokio::sync::watch::Receiver<Arc<SyncState>>,
    what: &str,
    pred: impl FnMut(&Arc<SyncState>) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(pred))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("coordinator dropped");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_client_sees_changes_through_push() {
    let server = tokio::task::spawn_blocking(|| start_server(Some(FIXTURE), None))
        .await
        .unwrap();
    // Polling is slow enough that only push can deliver within the wait.
    let client = |url: String| {
        Arc::new(SyncCoordinator::with_timing(
            Arc::new(HttpStore::new(&url, None, Duration::from_secs(5))),
            Duration::from_secs(600),
            Duration::from_secs(5),
        ))
    };
    let writer = client(server.url());
    let reader = client(server.url());

    let (stop, stopped) = tokio::sync::watch::channel(false);
    let mut runs = Vec::new();
    for coordinator in [writer.clone(), reader.clone()] {
        let mut stopped = stopped.clone();
        runs.push(tokio::spawn(async move {
            coordinator
                .run(async move {
                    let _ = stopped.wait_for(|s| *s).await;
                })
                .await;
        }));
    }

    let mut writer_rx = writer.subscribe();
    let mut reader_rx = reader.subscribe();
    wait_for_state(&mut writer_rx, "writer push connection", |s| {
        s.push_connected && s.ledger.transfers.len() == 5
    })
    .await;
    wait_for_state(&mut reader_rx, "reader push connection", |s| {
        s.push_connected && s.ledger.transfers.len() == 5
    })
    .await;

    let outcome = writer
        .create_transfer(NewTransfer::new(
            UnitId::Kasa,
            UnitId::Cila,
            "10".parse().unwrap(),
            Karat::K18,
        ))
        .await
        .unwrap();
    wait_for_state(&mut reader_rx, "pushed create", |s| {
        s.ledger.contains_transfer(&outcome.id)
    })
    .await;
    let state = reader.snapshot();
    assert_eq!(
        state.summary.unit(UnitId::Cila).unwrap().total_fire,
        Decimal::from(10)
    );
    assert_eq!(state.ledger, writer.snapshot().ledger);

    writer.delete_transfer(&outcome.id).await.unwrap();
    wait_for_state(&mut reader_rx, "pushed delete", |s| {
        !s.ledger.contains_transfer(&outcome.id)
    })
    .await;
    assert_eq!(
        reader.snapshot().summary.unit(UnitId::Kasa).unwrap().total_stock,
        Decimal::from(50)
    );

    stop.send(true).unwrap();
    for run in runs {
        run.await.unwrap();
    }
}

// ──────────────────────────────────────────────
// 4. Client subcommands against the server
// ──────────────────────────────────────────────

#[test]
fn cli_transfer_then_delete() {
    let server = start_server(Some(FIXTURE), None);

    let output = atolye_client(
        &server,
        &[
            "--output", "json", "transfer", "--from", "kasa", "--to", "cila", "--grams", "5",
            "--karat", "18", "--cinsi", "yüzük",
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = reply["id"].as_str().unwrap().to_string();
    assert_eq!(reply["reconciled"], true);
    assert_eq!(reply["conflict"], false);
    assert_eq!(reply["units"][0]["unit_id"], "kasa");
    assert_eq!(dec(&reply["units"][0]["total_stock"]), Decimal::from(45));
    assert_eq!(dec(&reply["units"][1]["total_fire"]), Decimal::from(5));

    let (_, body) = http_get(server.port, "/transfers");
    let listed = json(&body);
    let created = listed
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == id.as_str())
        .expect("created transfer listed");
    assert_eq!(created["cinsi"], "yüzük");

    let output = atolye_client(&server, &["--quiet", "delete", &id]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), id);

    let (_, body) = http_get(server.port, "/transfers");
    assert_eq!(json(&body).as_array().unwrap().len(), 5);
}

#[test]
fn cli_vault_deposit_text_output() {
    let server = start_server(None, None);
    let output = atolye_client(
        &server,
        &[
            "vault",
            "--direction",
            "deposit",
            "--grams",
            "8",
            "--karat",
            "24",
            "--counterparty",
            "Sarraf",
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("created vault transaction vt-"), "{stdout}");

    let output = atolye_client(&server, &["watch", "--once"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("External vault: stock 8 g, has 8 g"), "{stdout}");
    assert!(stdout.contains("Sarraf: has balance 8 g over 1 transaction(s)"));
}

#[test]
fn cli_output_only_source_rejected_without_server_change() {
    let server = start_server(Some(FIXTURE), None);
    let output = atolye_client(
        &server,
        &[
            "transfer", "--from", "satis", "--to", "kasa", "--grams", "1", "--karat", "18",
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot be a source"));

    let (_, body) = http_get(server.port, "/transfers");
    assert_eq!(json(&body).as_array().unwrap().len(), 5);
}

#[test]
fn cli_delete_unknown_id_succeeds() {
    let server = start_server(None, None);
    let output = atolye_client(&server, &["delete", "--vault", "vt-999999"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("deleted vault transaction vt-999999"));
}

#[test]
fn cli_watch_once_json() {
    let server = start_server(Some(FIXTURE), None);
    let output = atolye_client(&server, &["--output", "json", "watch", "--once"]);
    assert!(output.status.success());
    let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        dec(&state["summary"]["units"]["lazer-kesim"]["total_fire"]),
        Decimal::from(2)
    );
    assert!(state["warnings"].as_array().unwrap().is_empty());
}
