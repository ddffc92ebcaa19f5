use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{NewUser, User},
    state::AppState,
    utils::{json::ApiJson, params::parse_id},
};

const INVALID_USER_ID: &str = "Invalid user ID";

pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.service.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let id = parse_id(&id, INVALID_USER_ID)?;
    Ok(Json(state.service.get_user(id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<NewUser>,
) -> AppResult<Json<User>> {
    let id = parse_id(&id, INVALID_USER_ID)?;
    Ok(Json(state.service.update_user(id, payload).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, INVALID_USER_ID)?;
    state.service.delete_user(id).await?;
    Ok(Json(json!({ "result": "success" })))
}
