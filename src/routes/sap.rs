use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::{auth::ErpSession, error::AppResult, state::AppState, utils::json::ApiJson};

#[derive(Deserialize)]
pub struct SubmitLeaveRequest {
    pub start_date: String,
    pub end_date: String,
}

/// Forwards a leave request to the ERP on behalf of the session's employee.
pub async fn send_leave_request(
    State(state): State<AppState>,
    ErpSession(session): ErpSession,
    ApiJson(payload): ApiJson<SubmitLeaveRequest>,
) -> AppResult<Json<Value>> {
    let result = state
        .service
        .send_leave_request(&session, &payload.start_date, &payload.end_date)
        .await?;
    Ok(Json(result))
}
