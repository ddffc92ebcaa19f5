use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{LeaveRequest, NewLeaveRequest},
    state::AppState,
    utils::{
        json::ApiJson,
        params::{parse_id, PageParams},
    },
};

const INVALID_ID: &str = "Invalid leave request ID";

pub async fn create_leave_request(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<NewLeaveRequest>,
) -> AppResult<(StatusCode, Json<LeaveRequest>)> {
    let request = state.service.create_leave_request(payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_leave_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<LeaveRequest>> {
    let id = parse_id(&id, INVALID_ID)?;
    Ok(Json(state.service.get_leave_request(id).await?))
}

pub async fn update_leave_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<NewLeaveRequest>,
) -> AppResult<Json<LeaveRequest>> {
    let id = parse_id(&id, INVALID_ID)?;
    Ok(Json(state.service.update_leave_request(id, payload).await?))
}

pub async fn delete_leave_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, INVALID_ID)?;
    state.service.delete_leave_request(id).await?;
    Ok(Json(json!({ "result": "success" })))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Vec<LeaveRequest>>> {
    let user_id = parse_id(&user_id, "Invalid user ID")?;
    let requests = state
        .service
        .leave_requests_for_user(user_id, params.pagination())
        .await?;
    Ok(Json(requests))
}
