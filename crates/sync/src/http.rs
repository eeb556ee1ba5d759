//! HTTP ledger store client.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Talks to the JSON API served by `atolye serve`:
//!
//! | Method   | Path              | Body                     | Reply                  |
//! |----------|-------------------|--------------------------|------------------------|
//! | `GET`    | `/transfers`      |                          | `[TransferEvent]`      |
//! | `POST`   | `/transfers`      | `NewTransfer`            | `{"id": ...}`          |
//! | `DELETE` | `/transfers/{id}` |                          | `204`                  |
//! | `GET`    | `/vault`          |                          | `[VaultTransaction]`   |
//! | `POST`   | `/vault`          | `NewVaultTransaction`    | `{"id": ...}`          |
//! | `DELETE` | `/vault/{id}`     |                          | `204`                  |
//! | `GET`    | `/events`         |                          | `text/event-stream`    |
//!
//! `/events` is the push channel. Each message carries one [`PushEvent`] as
//! JSON in its `data` field; a message named `lagged` means the server dropped
//! notifications for this client, which the subscriber sees as
//! [`PushRecv::Lagged`]. The stream is read on a dedicated thread because a
//! subscription can stay open for the lifetime of the process.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use atolye_core::{
    decode_array, NewTransfer, NewVaultTransaction, RecordId, TransferEvent, ValidationError,
    VaultTransaction,
};
use atolye_storage::{LedgerStore, PushEvent, PushRecv, PushSubscription, StoreError};
use tokio::sync::{mpsc, oneshot};

use crate::config::SyncConfig;

/// Path of the server's event stream.
pub const EVENTS_PATH: &str = "/events";

/// SSE event name the server uses to report dropped notifications.
pub const LAGGED_EVENT: &str = "lagged";

/// Notifications buffered between the stream reader and the subscriber.
const PUSH_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Delete,
}

/// Error body returned by the server for any non-2xx status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    validation: Option<ValidationError>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: RecordId,
}

/// `LedgerStore` over HTTP+JSON.
///
/// - `store_url` is the server's base URL
/// - `api_key`, if set, is sent as `Authorization: Bearer <key>`
pub struct HttpStore {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    agent: ureq::Agent,
    /// Only connecting and the response head are bounded; the body is open-ended.
    stream_agent: ureq::Agent,
}

impl HttpStore {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        let stream_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .build();
        HttpStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            agent: ureq::Agent::new_with_config(config),
            stream_agent: ureq::Agent::new_with_config(stream_config),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            &config.store_url,
            config.api_key.clone(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| format!("Bearer {}", key))
    }

    /// Send one request and return the body of a 2xx reply.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, StoreError> {
        let url = self.url(path);
        let agent = self.agent.clone();
        let auth = self.auth_header();
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        tokio::task::spawn_blocking(move || {
            let sent = match method {
                Method::Get => {
                    let mut request = agent.get(&url);
                    if let Some(ref auth) = auth {
                        request = request.header("Authorization", auth);
                    }
                    request.call()
                }
                Method::Delete => {
                    let mut request = agent.delete(&url);
                    if let Some(ref auth) = auth {
                        request = request.header("Authorization", auth);
                    }
                    request.call()
                }
                Method::Post => {
                    let mut request = agent.post(&url);
                    if let Some(ref auth) = auth {
                        request = request.header("Authorization", auth);
                    }
                    request.send_json(body.unwrap_or(serde_json::Value::Null))
                }
            };

            let mut response = sent.map_err(|e| match e {
                ureq::Error::Timeout(_) => StoreError::Timeout { millis: timeout_ms },
                other => StoreError::Transient {
                    message: format!("{method:?} {url}: {other}"),
                },
            })?;
            let status = response.status().as_u16();
            let text = response
                .body_mut()
                .read_to_string()
                .map_err(|e| StoreError::Transient {
                    message: format!("failed to read response body: {e}"),
                })?;
            tracing::debug!(?method, %url, status, "store request");
            check_status(status, text)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {e}")))?
    }

    /// GET a record array, dropping records this client cannot decode.
    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        let text = self.request(Method::Get, path, None).await?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
                message: format!("GET {path}: {e}"),
            })?;
        let decoded = decode_array::<T>(value).map_err(|e| StoreError::Malformed {
            message: format!("GET {path}: {e}"),
        })?;
        if !decoded.rejected.is_empty() {
            tracing::warn!(
                path,
                dropped = decoded.rejected.len(),
                kept = decoded.records.len(),
                "store listing contained malformed records"
            );
        }
        Ok(decoded.records)
    }

    async fn create(&self, path: &str, body: serde_json::Value) -> Result<RecordId, StoreError> {
        let text = self.request(Method::Post, path, Some(body)).await?;
        let created: Created = serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
            message: format!("POST {path}: {e}"),
        })?;
        Ok(created.id)
    }
}

/// Map an HTTP status and body to the store error model.
///
/// 4xx replies carrying a validation payload become `Rejected`; other 4xx are
/// backend errors; 5xx are transient.
fn check_status(status: u16, body: String) -> Result<String, StoreError> {
    if (200..300).contains(&status) {
        return Ok(body);
    }
    let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        400..=499 => match parsed.and_then(|b| b.validation) {
            Some(validation) => Err(StoreError::Rejected(validation)),
            None => Err(StoreError::Backend(format!("HTTP {status}: {message}"))),
        },
        _ => Err(StoreError::Transient {
            message: format!("HTTP {status}: {message}"),
        }),
    }
}

/// `{collection}/{id}` with the id percent-encoded as a single path segment.
fn record_path(collection: &str, id: &str) -> String {
    let mut path = String::with_capacity(collection.len() + 1 + id.len());
    path.push_str(collection);
    path.push('/');
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                path.push(byte as char)
            }
            other => path.push_str(&format!("%{other:02X}")),
        }
    }
    path
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(format!("serialize request: {e}")))
}

#[async_trait]
impl LedgerStore for HttpStore {
    async fn list_transfers(&self) -> Result<Vec<TransferEvent>, StoreError> {
        self.list("/transfers").await
    }

    async fn create_transfer(&self, transfer: NewTransfer) -> Result<RecordId, StoreError> {
        self.create("/transfers", to_body(&transfer)?).await
    }

    async fn delete_transfer(&self, id: &str) -> Result<(), StoreError> {
        self.request(Method::Delete, &record_path("/transfers", id), None)
            .await
            .map(|_| ())
    }

    async fn list_vault_transactions(&self) -> Result<Vec<VaultTransaction>, StoreError> {
        self.list("/vault").await
    }

    async fn create_vault_transaction(
        &self,
        transaction: NewVaultTransaction,
    ) -> Result<RecordId, StoreError> {
        self.create("/vault", to_body(&transaction)?).await
    }

    async fn delete_vault_transaction(&self, id: &str) -> Result<(), StoreError> {
        self.request(Method::Delete, &record_path("/vault", id), None)
            .await
            .map(|_| ())
    }

    /// Connect to `/events`. `None` if the server refuses or does not answer
    /// within the request timeout; the coordinator then polls and retries.
    async fn subscribe(&self) -> Option<PushSubscription> {
        let url = self.url(EVENTS_PATH);
        let auth = self.auth_header();
        let agent = self.stream_agent.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(PUSH_QUEUE);

        let spawned = std::thread::Builder::new()
            .name("atolye-push".into())
            .spawn(move || read_event_stream(agent, url, auth, ready_tx, tx));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to start push reader");
            return None;
        }

        match tokio::time::timeout(self.timeout, ready_rx).await {
            Ok(Ok(true)) => Some(PushSubscription::forwarded(rx)),
            Ok(_) => None,
            Err(_) => {
                tracing::debug!("push channel handshake timed out");
                None
            }
        }
    }
}

// ── Push channel ─────────────────────────────────────────────────────────────

/// Open the event stream and forward notifications until the stream ends or
/// the subscription is dropped. `ready` reports whether the server accepted.
fn read_event_stream(
    agent: ureq::Agent,
    url: String,
    auth: Option<String>,
    ready: oneshot::Sender<bool>,
    tx: mpsc::Sender<PushRecv>,
) {
    let mut request = agent.get(&url).header("Accept", "text/event-stream");
    if let Some(ref auth) = auth {
        request = request.header("Authorization", auth);
    }
    let response = match request.call() {
        Ok(response) if response.status().as_u16() == 200 => response,
        Ok(response) => {
            tracing::debug!(%url, status = response.status().as_u16(), "push channel refused");
            let _ = ready.send(false);
            return;
        }
        Err(e) => {
            tracing::debug!(%url, error = %e, "push channel unreachable");
            let _ = ready.send(false);
            return;
        }
    };
    if ready.send(true).is_err() {
        return;
    }
    tracing::debug!(%url, "push channel open");

    let reader = BufReader::new(response.into_body().into_reader());
    let mut parser = EventStreamParser::default();
    for line in reader.lines() {
        // Keep-alive comments make this check run even on a quiet ledger.
        if tx.is_closed() {
            return;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "push stream interrupted");
                return;
            }
        };
        if let Some(recv) = parser.feed(&line) {
            if tx.blocking_send(recv).is_err() {
                return;
            }
        }
    }
    tracing::debug!("push stream ended");
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
struct EventStreamParser {
    event: Option<String>,
    data: Vec<String>,
}

impl EventStreamParser {
    /// Feed one line without its terminator. A blank line completes a message.
    fn feed(&mut self, line: &str) -> Option<PushRecv> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<PushRecv> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        if event.is_none() && data.is_empty() {
            return None;
        }
        if event.as_deref() == Some(LAGGED_EVENT) {
            return Some(PushRecv::Lagged(data.trim().parse().unwrap_or(1)));
        }
        match serde_json::from_str::<PushEvent>(&data) {
            Ok(push) => Some(PushRecv::Event(push)),
            Err(e) => {
                // Something was missed; make the subscriber refetch.
                tracing::warn!(error = %e, "undecodable push notification");
                Some(PushRecv::Lagged(1))
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
