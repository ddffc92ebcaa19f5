use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{error::AppResult, state::AppState, utils::json::ApiJson};

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub personnel_number: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let token = state
        .service
        .login(&payload.personnel_number, &payload.password)
        .await?;
    Ok(Json(LoginResponse { token }))
}
