//! The REST route table.
//!
//! Grounded on `original_source/linear_stage/generic/main.py`'s FastAPI
//! route table (`GET/POST /position`, `GET/POST /absolute_position`,
//! `GET /parameter`, `GET/POST /parameter/{name}`, `POST /token`), carried
//! over onto an `axum::Router` built in `main()` with handlers living
//! alongside it. Functionality the FastAPI original didn't expose under
//! those names — full stage/sensor command dispatch, batched sensor reads,
//! a combined per-device snapshot — is kept under additional routes that
//! don't collide with the literal ones above.

use std::sync::Arc;

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use labctrl_core::{CommandResponse, OperationResult, SensorOperation, StageOperation, TargetRequest, Unit};

use crate::auth::{AuthError, Claims};
use crate::config::AccessLevel;
use crate::device::{stage, DeviceSessionError};
use crate::AppState;

const POSITION: &str = "position";

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(CommandResponse::error(OperationResult::ErrorGeneric, message)),
    )
        .into_response()
}

async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    required: AccessLevel,
) -> Result<Claims, Response> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

    let claims = state.auth.validate(token).await.map_err(|e| match e {
        AuthError::TokenInvalid => error_response(StatusCode::UNAUTHORIZED, e.to_string()),
        _ => error_response(StatusCode::UNAUTHORIZED, e.to_string()),
    })?;

    crate::auth::AuthEngine::require_at_least(&claims, required)
        .map_err(|e| error_response(StatusCode::FORBIDDEN, e.to_string()))?;

    Ok(claims)
}

fn result_to_status(result: OperationResult) -> StatusCode {
    match result {
        OperationResult::Ok | OperationResult::WarnNoAction => StatusCode::OK,
        OperationResult::SoftLimitExceeded | OperationResult::InvalidAction => StatusCode::BAD_REQUEST,
        OperationResult::TransportRw
        | OperationResult::ResponseValidationFailure
        | OperationResult::DeviceError
        | OperationResult::ErrorGeneric => StatusCode::BAD_GATEWAY,
    }
}

fn device_error_response(err: DeviceSessionError) -> Response {
    let result = OperationResult::from(&err);
    (result_to_status(result), Json(CommandResponse::error(result, err.to_string()))).into_response()
}

// ─── unauthenticated ────────────────────────────────────────────────────

async fn resource_listing() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "resources": ["stage", "sensor"] }))
}

async fn status_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

async fn issue_token(State(state): State<Arc<AppState>>, Form(body): Form<LoginRequest>) -> Response {
    match state.auth.issue(&body.username, &body.password).await {
        Ok(token) => Json(TokenResponse {
            access_token: token,
            token_type: "bearer",
        })
        .into_response(),
        Err(e) => error_response(StatusCode::UNAUTHORIZED, e.to_string()),
    }
}

// ─── literal per-parameter surface (stage's "position" parameter) ──────

#[derive(Deserialize)]
struct LogicalValueRequest {
    value: i64,
}

#[derive(Serialize)]
struct LogicalValueResponse {
    value: i64,
}

#[derive(Deserialize)]
struct PhysicalValueRequest {
    value: f64,
    unit: Unit,
}

#[derive(Serialize)]
struct PhysicalValueResponse {
    value: f64,
    unit: Unit,
}

async fn get_position(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Readonly).await {
        return resp;
    }
    let device_state = state.stage.state.read().await;
    let Some(spec) = device_state.parameter(POSITION) else {
        return error_response(StatusCode::NOT_FOUND, "no such parameter: position");
    };
    Json(LogicalValueResponse { value: spec.value }).into_response()
}

async fn set_position(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LogicalValueRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Standard).await {
        return resp;
    }
    let target = TargetRequest {
        logical: Some(body.value),
        ..Default::default()
    };
    match stage::dispatch(&state.stage, StageOperation::SetPosition { target }).await {
        Ok(r) => Json(LogicalValueResponse {
            value: r.value.unwrap_or(body.value),
        })
        .into_response(),
        Err(e) => device_error_response(e),
    }
}

async fn get_absolute_position(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Readonly).await {
        return resp;
    }
    let unit = {
        let device_state = state.stage.state.read().await;
        match device_state.parameter(POSITION) {
            Some(spec) => spec.step.unit,
            None => return error_response(StatusCode::NOT_FOUND, "no such parameter: position"),
        }
    };
    match state.stage.physical_value(POSITION, unit).await {
        Ok(q) => Json(PhysicalValueResponse {
            value: q.value,
            unit: q.unit,
        })
        .into_response(),
        Err(e) => device_error_response(e),
    }
}

async fn set_absolute_position(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PhysicalValueRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Standard).await {
        return resp;
    }
    let target = TargetRequest {
        physical: Some(body.value),
        unit: Some(body.unit),
        ..Default::default()
    };
    match stage::dispatch(&state.stage, StageOperation::SetPosition { target }).await {
        Ok(_) => match state.stage.physical_value(POSITION, body.unit).await {
            Ok(q) => Json(PhysicalValueResponse {
                value: q.value,
                unit: q.unit,
            })
            .into_response(),
            Err(e) => device_error_response(e),
        },
        Err(e) => device_error_response(e),
    }
}

async fn list_parameters(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Readonly).await {
        return resp;
    }
    let device_state = state.stage.state.read().await;
    Json(&device_state.parameters).into_response()
}

fn stage_set_operation(name: &str, target: TargetRequest) -> Result<StageOperation, Response> {
    match name {
        "position" => Ok(StageOperation::SetPosition { target }),
        "velocity" => Ok(StageOperation::SetVelocity { target }),
        "acceleration" => Ok(StageOperation::SetAcceleration { target }),
        other => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("no such parameter: {other}"),
        )),
    }
}

async fn get_parameter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Readonly).await {
        return resp;
    }
    let device_state = state.stage.state.read().await;
    match device_state.parameter(&name) {
        Some(spec) => Json(LogicalValueResponse { value: spec.value }).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("no such parameter: {name}")),
    }
}

async fn set_parameter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<TargetRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Standard).await {
        return resp;
    }
    let op = match stage_set_operation(&name, body) {
        Ok(op) => op,
        Err(resp) => return resp,
    };
    match stage::dispatch(&state.stage, op).await {
        Ok(r) => Json(LogicalValueResponse {
            value: r.value.unwrap_or_default(),
        })
        .into_response(),
        Err(e) => device_error_response(e),
    }
}

// ─── additive: full stage/sensor command dispatch ──────────────────────

async fn stage_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(op): Json<StageOperation>,
) -> Response {
    let required = match op {
        StageOperation::GetStatus => AccessLevel::Readonly,
        _ => AccessLevel::Standard,
    };
    if let Err(resp) = authorize(&state, &headers, required).await {
        return resp;
    }
    match stage::dispatch(&state.stage, op).await {
        Ok(r) => {
            info!(result = %r.result, "stage command processed");
            (result_to_status(r.result), Json(r)).into_response()
        }
        Err(e) => device_error_response(e),
    }
}

async fn sensor_status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Readonly).await {
        return resp;
    }
    match state.sensor.dispatch(SensorOperation::GetStatus).await {
        Ok(r) => Json(r).into_response(),
        Err(e) => device_error_response(e),
    }
}

async fn sensor_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(op): Json<SensorOperation>,
) -> Response {
    let required = match op {
        SensorOperation::GetStatus | SensorOperation::GetSample => AccessLevel::Readonly,
        SensorOperation::GetDataBatch { .. } => AccessLevel::Standard,
        SensorOperation::StartContinuousSampling | SensorOperation::StopContinuousSampling => {
            AccessLevel::Standard
        }
    };
    if let Err(resp) = authorize(&state, &headers, required).await {
        return resp;
    }
    match state.sensor.dispatch(op).await {
        Ok(r) => (result_to_status(r.result), Json(r)).into_response(),
        Err(e) => device_error_response(e),
    }
}

#[derive(Deserialize)]
struct BatchQuery {
    size: u32,
}

async fn data_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BatchQuery>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Standard).await {
        return resp;
    }
    match state
        .sensor
        .dispatch(SensorOperation::GetDataBatch {
            batch_size: query.size,
        })
        .await
    {
        Ok(r) => Json(r).into_response(),
        Err(e) => device_error_response(e),
    }
}

async fn device_data(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, AccessLevel::Readonly).await {
        return resp;
    }
    match name.as_str() {
        "stage" => match stage::dispatch(&state.stage, StageOperation::GetStatus).await {
            Ok(r) => Json(r).into_response(),
            Err(e) => device_error_response(e),
        },
        "sensor" => match state.sensor.dispatch(SensorOperation::GetSample).await {
            Ok(r) => Json(r).into_response(),
            Err(e) => device_error_response(e),
        },
        other => error_response(StatusCode::NOT_FOUND, format!("no such device: {other}")),
    }
}

/// Builds the HTTP half of the router. Left generic over `Arc<AppState>`
/// so `main` can merge in the WS route before calling `with_state` once.
pub fn build_router(cors: CorsLayer) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(resource_listing))
        .route("/status", get(status_check))
        .route("/token", post(issue_token))
        .route("/position", get(get_position).post(set_position))
        .route("/absolute_position", get(get_absolute_position).post(set_absolute_position))
        .route("/parameter", get(list_parameters))
        .route("/parameter/:name", get(get_parameter).post(set_parameter))
        .route("/stage/command", post(stage_command))
        .route("/sensor/status", get(sensor_status))
        .route("/sensor/command", post(sensor_command))
        .route("/data/batch", get(data_batch))
        .route("/data/:name", get(device_data))
        .layer(cors)
}
