//! HTTP surface of alicd
//!
//! Maps the licensing engine onto the routes in [`alic_api`]:
//! - Granted checks answer 200, denials 403 with the reason code
//! - Unknown sessions answer 404 `{"detail": "Session not found"}`
//! - Store and directory faults answer 500

use alic_api::{
    BadLicense, CheckLicenseRequest, ErrorDetail, GoodLicense, HealthStatus, SessionIdRequest,
    Successful, CHECK_LICENSE_PATH, END_SESSION_PATH, HEALTH_PATH, KEEPALIVE_PATH,
};
use alic_core::{CheckDecision, CoreError, EndDecision, KeepAliveDecision, LicensingEngine};
use alic_util::{Clock, Fingerprint, LicenseKey};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::debug;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LicensingEngine>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(engine: Arc<LicensingEngine>, clock: Arc<dyn Clock>) -> Self {
        Self { engine, clock }
    }
}

/// Failure of a session call
enum ApiError {
    SessionNotFound,
    Internal(CoreError),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::SessionNotFound => {
                (StatusCode::NOT_FOUND, Json(ErrorDetail::session_not_found())).into_response()
            }
            ApiError::Internal(e) => {
                debug!(op = e.op(), error = %e, "Request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorDetail::internal()),
                )
                    .into_response()
            }
        }
    }
}

async fn check_license(
    State(state): State<AppState>,
    Json(request): Json<CheckLicenseRequest>,
) -> Result<Response, ApiError> {
    let license_key = LicenseKey::new(request.license_key);
    let fingerprint = Fingerprint::new(request.fingerprint);

    let decision = state
        .engine
        .check_license(&license_key, &fingerprint, state.clock.now())
        .await?;

    Ok(match decision {
        CheckDecision::Granted(granted) => Json(GoodLicense::new(
            granted.session_id.to_string(),
            granted.additional_content_signature,
            granted.additional_content_product,
        ))
        .into_response(),
        CheckDecision::Denied(reason) => {
            (StatusCode::FORBIDDEN, Json(BadLicense::new(reason))).into_response()
        }
    })
}

async fn keep_alive(
    State(state): State<AppState>,
    Json(request): Json<SessionIdRequest>,
) -> Result<Json<Successful>, ApiError> {
    match state
        .engine
        .keep_alive(&request.session_id, state.clock.now())
        .await?
    {
        KeepAliveDecision::Renewed(_) => Ok(Json(Successful::default())),
        KeepAliveDecision::NotFound => Err(ApiError::SessionNotFound),
    }
}

async fn end_session(
    State(state): State<AppState>,
    Json(request): Json<SessionIdRequest>,
) -> Result<Json<Successful>, ApiError> {
    match state.engine.end_session(&request.session_id).await? {
        EndDecision::Ended => Ok(Json(Successful::default())),
        EndDecision::NotFound => Err(ApiError::SessionNotFound),
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.engine.health().await;
    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Build the HTTP router over the given state.
///
/// `check_license` accepts GET as well as POST for clients that send a
/// JSON body with GET.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(CHECK_LICENSE_PATH, get(check_license).post(check_license))
        .route(KEEPALIVE_PATH, post(keep_alive))
        .route(END_SESSION_PATH, post(end_session))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}
