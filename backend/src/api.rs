use crate::access::DecryptionResult;
use crate::errors::PrivacyError;
use crate::models::*;
use crate::orchestrator::{ResearchAccessResponse, SubmissionResult, ValidationOutcome};
use crate::record::{CaseStudyRecord, EncryptedPayload};
use crate::session::AccessSession;
use crate::state::AppState;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/records", post(submit_record))
        .route("/api/v1/records/:id/privacy", get(get_record_privacy))
        .route("/api/v1/records/:id/validations", post(validate_record))
        .route("/api/v1/access", post(request_access))
        .route("/api/v1/access/:id", get(get_session))
        .route("/api/v1/access/:id/approve", post(approve_session))
        .route("/api/v1/access/:id/reject", post(reject_session))
        .route("/api/v1/access/:id/decrypt", post(decrypt_session))
        .route("/api/v1/access/:id/cancel", post(cancel_session))
        .route("/api/v1/compression/estimate", post(estimate_compression))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == state.config.api_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!(path = %request.uri().path(), "unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

async fn submit_record(
    State(state): State<AppState>,
    Json(req): Json<SubmitRecordRequest>,
) -> Result<Json<SubmissionResult>, PrivacyError> {
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(req.ciphertext_b64)
        .map_err(|_| PrivacyError::Validation("invalid ciphertext_b64".to_string()))?;

    let record = CaseStudyRecord {
        id: req.record_id.unwrap_or_else(Uuid::new_v4),
        payload: EncryptedPayload {
            ciphertext,
            content_id: req.content_id,
            metadata_hash: req.metadata_hash,
            scheme: req.scheme,
        },
        facts: req.facts,
        proof_params: req.proof_params,
    };

    let result = state.orchestrator.submit_with_privacy(record, req.options).await?;
    Ok(Json(result))
}

async fn get_record_privacy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordPrivacyResponse>, PrivacyError> {
    Ok(Json(RecordPrivacyResponse::load(&state.orchestrator, id).await?))
}

async fn validate_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ValidationRequest>,
) -> Result<Json<ValidationOutcome>, PrivacyError> {
    let outcome = state
        .orchestrator
        .validate_with_privacy(&req.validator, id, req.inputs)
        .await?;
    Ok(Json(outcome))
}

async fn request_access(
    State(state): State<AppState>,
    Json(req): Json<AccessRequest>,
) -> Result<Json<ResearchAccessResponse>, PrivacyError> {
    let stats = state.orchestrator.record_stats(req.record_id).await?;
    let response = state
        .orchestrator
        .request_research_access(&req.requester, req.record_id, &req.justification, &stats, req.threshold)
        .await?;
    Ok(Json(response))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccessSession>, PrivacyError> {
    Ok(Json(state.orchestrator.access().get_session(id).await?))
}

async fn approve_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<AccessSession>, PrivacyError> {
    let session = state
        .orchestrator
        .access()
        .approve(id, &req.validator, &req.share_commitment)
        .await?;
    Ok(Json(session))
}

async fn reject_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<AccessSession>, PrivacyError> {
    let session = state.orchestrator.access().reject(id, &req.validator, &req.reason).await?;
    Ok(Json(session))
}

async fn decrypt_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RequesterRequest>,
) -> Result<Json<DecryptionResult>, PrivacyError> {
    Ok(Json(state.orchestrator.access().decrypt(id, &req.requester).await?))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RequesterRequest>,
) -> Result<Json<CancelResponse>, PrivacyError> {
    state.orchestrator.access().cancel(id, &req.requester).await?;
    Ok(Json(CancelResponse { session_id: id, cancelled: true }))
}

async fn estimate_compression(
    State(state): State<AppState>,
    Json(req): Json<EstimateRequest>,
) -> Json<EstimateResponse> {
    let compression = state.orchestrator.compression();
    Json(EstimateResponse {
        estimate: compression.estimate(req.size_bytes, req.ratio),
        max_ratio: compression.max_ratio(),
    })
}
