use axum::{extract::State, Json};

use crate::{
    clients::{IntentResponse, UserInput},
    error::AppResult,
    state::AppState,
    utils::json::ApiJson,
};

pub async fn classify_intent(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<UserInput>,
) -> AppResult<Json<IntentResponse>> {
    Ok(Json(state.service.process_message(input).await?))
}
