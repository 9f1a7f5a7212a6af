// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::archive::ArchiveFile;
use crate::storage::{PendingDerivation, Storage};
use crate::tx_sequencer::SequencerStatsSnapshot;
use crate::workflow::{
    Registrar, RegistrationOutcome, RegistrationRequest, UploadContext, UploadRequest,
    WorkflowError,
};

pub use error::ApiError;

const DEFAULT_REQUESTER: &str = "anonymous";
const DEFAULT_PENDING_LIMIT: usize = 100;
const MAX_PENDING_LIMIT: usize = 1000;

pub struct AppState {
    pub registrar: Arc<Registrar>,
    pub db_path: String,
    pub sqlite_synchronous: String,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterQuery {
    claim: Option<String>,
    estimate: Option<String>,
    deduplicate: Option<String>,
}

impl RegisterQuery {
    /// Transfers are requested unless the caller opts out explicitly.
    fn claim(&self) -> bool {
        self.claim.as_deref().is_none_or(flag_enabled)
    }

    fn estimate(&self) -> bool {
        self.estimate.as_deref().is_some_and(flag_enabled)
    }

    fn deduplicate(&self) -> Option<bool> {
        self.deduplicate.as_deref().map(flag_enabled)
    }
}

fn flag_enabled(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileBody {
    name: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    /// Base64-encoded file content.
    data: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PendingResponse {
    ok: bool,
    pending: Vec<PendingDerivation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    ok: bool,
    tx_hash: String,
    resolved: bool,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    ok: bool,
    sequencer: SequencerStatsSnapshot,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    archive: bool,
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let mut router = Router::new()
        .route("/iscn/new", post(register_record))
        .route("/iscn/pending", get(list_pending))
        .route("/iscn/pending/{tx_hash}", delete(resolve_pending))
        .route("/stats", get(sequencer_stats))
        .route("/health", get(health));
    if state.registrar.has_archive() {
        router = router.route("/iscn/upload", post(upload_record));
    }
    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn register_record(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegisterQuery>,
    req: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let fields = body_object(&body)?;
    let metadata = match fields.get("metadata") {
        Some(metadata) if !metadata.is_null() => metadata.clone(),
        _ => body.clone(),
    };
    let request = registration_request(fields, metadata, &query);

    let registrar = Arc::clone(&state.registrar);
    let outcome = run_detached(async move { registrar.register(request).await }).await?;
    Ok(outcome_response(outcome))
}

async fn upload_record(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegisterQuery>,
    req: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let fields = body_object(&body)?;
    let files = decode_files(fields.get("files"))?;
    let deduplicate = query
        .deduplicate()
        .or_else(|| fields.get("deduplicate").and_then(Value::as_bool))
        .unwrap_or(true);
    let metadata = fields.get("metadata").cloned().unwrap_or(Value::Null);
    let registration = registration_request(fields, metadata, &query);

    let registrar = Arc::clone(&state.registrar);
    let outcome = run_detached(async move {
        registrar
            .upload(UploadRequest {
                files,
                deduplicate,
                registration,
            })
            .await
    })
    .await?;
    Ok(outcome_response(outcome))
}

/// Broadcasting workflows run on their own task: a client that disconnects
/// mid-request does not cancel a half-sent transaction.
async fn run_detached<F>(workflow: F) -> Result<RegistrationOutcome, ApiError>
where
    F: Future<Output = Result<RegistrationOutcome, WorkflowError>> + Send + 'static,
{
    tokio::spawn(workflow)
        .await
        .map_err(|err| ApiError::internal_error(format!("registration task failed: {err}")))?
        .map_err(ApiError::from)
}

async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PENDING_LIMIT)
        .min(MAX_PENDING_LIMIT);
    let pending = with_storage(&state, move |storage| {
        storage.load_pending_derivations(limit)
    })
    .await?;

    Ok(Json(PendingResponse { ok: true, pending }))
}

/// Manual follow-up: drops a tx from the pending list once its record id
/// has been checked by hand.
async fn resolve_pending(
    State(state): State<Arc<AppState>>,
    Path(tx_hash): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let key = tx_hash.clone();
    let resolved = with_storage(&state, move |storage| {
        storage.resolve_pending_derivation(&key)
    })
    .await?;
    info!(%tx_hash, resolved, "pending derivation resolved by operator");

    Ok(Json(ResolveResponse {
        ok: true,
        tx_hash,
        resolved,
    }))
}

/// Runs a read or maintenance query on its own connection, off the async
/// runtime. The journal writer keeps the only long-lived connection.
async fn with_storage<T, F>(state: &AppState, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Storage) -> rusqlite::Result<T> + Send + 'static,
{
    let db_path = state.db_path.clone();
    let synchronous = state.sqlite_synchronous.clone();
    tokio::task::spawn_blocking(move || {
        let mut storage = Storage::open(&db_path, &synchronous).map_err(|err| err.to_string())?;
        query(&mut storage).map_err(|err| err.to_string())
    })
    .await
    .map_err(|err| ApiError::internal_error(format!("storage task failed: {err}")))?
    .map_err(ApiError::internal_error)
}

async fn sequencer_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        ok: true,
        sequencer: state.registrar.sequencer().stats().snapshot(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        archive: state.registrar.has_archive(),
    })
}

fn body_object(body: &Value) -> Result<&Map<String, Value>, ApiError> {
    body.as_object()
        .ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))
}

fn registration_request(
    fields: &Map<String, Value>,
    metadata: Value,
    query: &RegisterQuery,
) -> RegistrationRequest {
    RegistrationRequest {
        metadata,
        owner_wallet: string_field(fields, "wallet"),
        requester: string_field(fields, "requester")
            .unwrap_or_else(|| DEFAULT_REQUESTER.to_string()),
        provider: string_field(fields, "provider"),
        claim: query.claim(),
        estimate: query.estimate(),
        upload: UploadContext::default(),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn decode_files(value: Option<&Value>) -> Result<Vec<ArchiveFile>, ApiError> {
    let value = value.ok_or_else(|| ApiError::bad_request("missing files"))?;
    let bodies: Vec<UploadFileBody> = serde_json::from_value(value.clone())
        .map_err(|err| ApiError::bad_request(format!("invalid files: {err}")))?;
    if bodies.is_empty() {
        return Err(ApiError::bad_request("missing files"));
    }
    bodies
        .into_iter()
        .map(|file| {
            let data = STANDARD.decode(file.data.as_bytes()).map_err(|err| {
                ApiError::bad_request(format!("file {} is not valid base64: {err}", file.name))
            })?;
            Ok(ArchiveFile {
                name: file.name,
                content_type: file.content_type,
                data,
            })
        })
        .collect()
}

fn outcome_response(outcome: RegistrationOutcome) -> Response {
    match outcome {
        RegistrationOutcome::Quote(quote) => Json(quote).into_response(),
        RegistrationOutcome::Registered(registration) => {
            info!(
                tx_hash = %registration.receipt.tx_hash,
                iscn_id = registration.receipt.iscn_id.as_deref().unwrap_or("-"),
                transfer_started = registration.transfer.is_some(),
                "record registration answered"
            );
            Json(registration.receipt).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeIndexer, TestHarness};
    use serde_json::json;
    use std::time::Duration;

    fn app_state(harness: &TestHarness) -> Arc<AppState> {
        Arc::new(AppState {
            registrar: harness.registrar.clone(),
            db_path: String::new(),
            sqlite_synchronous: "NORMAL".to_string(),
        })
    }

    fn query(claim: Option<&str>, estimate: Option<&str>) -> RegisterQuery {
        RegisterQuery {
            claim: claim.map(str::to_string),
            estimate: estimate.map(str::to_string),
            deduplicate: None,
        }
    }

    #[test]
    fn claim_defaults_on_and_estimate_defaults_off() {
        let q = RegisterQuery::default();
        assert!(q.claim());
        assert!(!q.estimate());

        let q = query(Some("0"), Some("1"));
        assert!(!q.claim());
        assert!(q.estimate());

        let q = query(Some(""), Some(""));
        assert!(!q.claim());
        assert!(!q.estimate());
        assert_eq!(q.deduplicate(), None);
    }

    #[test]
    fn request_fields_fall_back_to_anonymous_requester() {
        let body = json!({ "wallet": "like1owner", "requester": "", "name": "x" });
        let fields = body_object(&body).expect("object");
        let request = registration_request(fields, body.clone(), &RegisterQuery::default());

        assert_eq!(request.owner_wallet.as_deref(), Some("like1owner"));
        assert_eq!(request.requester, DEFAULT_REQUESTER);
        assert!(request.provider.is_none());
        assert!(request.claim);
    }

    #[test]
    fn files_are_base64_decoded() {
        let files = decode_files(Some(&json!([
            { "name": "a.txt", "contentType": "text/plain", "data": "aGVsbG8=" },
            { "name": "b.bin", "data": "" }
        ])))
        .expect("files");

        assert_eq!(files[0].data, b"hello".to_vec());
        assert_eq!(files[1].content_type, "application/octet-stream");
    }

    #[test]
    fn bad_file_payloads_are_client_errors() {
        let err = decode_files(Some(&json!([{ "name": "a", "data": "***" }]))).unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");

        let err = decode_files(Some(&json!([]))).unwrap_err();
        assert!(err.to_string().contains("missing files"));

        assert!(decode_files(None).is_err());
    }

    #[tokio::test]
    async fn registration_continues_after_client_disconnects() {
        let harness = TestHarness::builder().indexer(FakeIndexer::default()).build();
        let response = register_record(
            State(app_state(&harness)),
            Query(query(Some("0"), None)),
            Ok(Json(json!({ "name": "Disconnected", "requester": "api-client" }))),
        );

        // The caller gives up before the workflow gets to run.
        assert!(tokio::time::timeout(Duration::ZERO, response).await.is_err());
        assert!(harness.publisher.log_types().is_empty());

        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.publisher.log_types().len() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("registration finished without a caller");

        assert_eq!(
            harness.publisher.log_types(),
            vec!["ISCNDerivationMissing", "ISCNFreeRegister"]
        );
        assert_eq!(
            harness.ledger.accepted_sequences(),
            vec![TestHarness::INITIAL_SEQUENCE]
        );
    }

    #[tokio::test]
    async fn registration_errors_map_to_api_errors() {
        let harness = TestHarness::builder().chain_upgrading(true).build();

        let err = register_record(
            State(app_state(&harness)),
            Query(RegisterQuery::default()),
            Ok(Json(json!({ "name": "Blocked" }))),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::ChainUpgrading(_)));
        assert!(harness.ledger.attempted_sequences().is_empty());
    }
}
