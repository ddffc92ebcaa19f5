//! Client for the ERP's OData leave-request service.
//!
//! Login is a credential probe: a `GET` on the leave collection with Basic
//! credentials and `X-CSRF-Token: Fetch`. A 200 means the credentials are good
//! and the response carries the CSRF token and session cookies that later
//! writes must replay.

use std::time::Duration;

use anyhow::Result;
use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, COOKIE, SET_COOKIE},
    Client, StatusCode,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::build_http_client;
use crate::{
    auth::session::{basic_credentials, SessionToken},
    config::{AppConfig, LeaveSubmitMethod},
};

const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_FETCH: &str = "Fetch";

#[derive(Debug, Error)]
pub enum ErpError {
    #[error("erp request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("erp rejected the credentials with {0}")]
    Rejected(StatusCode),
    #[error("erp returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("erp response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct LeaveRequestEnvelope {
    pub d: LeaveRequestPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaveRequestPayload {
    pub personnel_number: String,
    pub request_id: String,
    pub status: String,
    pub status_text: String,
    pub start_date: String,
    pub end_date: String,
    pub request_or_attabs: String,
    pub attabs_hours: String,
    pub attendance_absence_days: String,
    pub calendar_days: String,
    pub payroll_days: String,
    pub payroll_hours: String,
    pub subtype_description: String,
    pub deduction: String,
    pub deduction_tooltip: String,
}

impl LeaveRequestEnvelope {
    pub fn new(personnel_number: &str, start_date: &str, end_date: &str) -> Self {
        Self {
            d: LeaveRequestPayload {
                personnel_number: personnel_number.to_string(),
                request_id: new_request_id(),
                status: String::new(),
                status_text: String::new(),
                start_date: start_date.to_string(),
                end_date: end_date.to_string(),
                request_or_attabs: String::new(),
                attabs_hours: "0.00".to_string(),
                attendance_absence_days: "0.00".to_string(),
                calendar_days: "1.00".to_string(),
                payroll_days: "0.00".to_string(),
                payroll_hours: "0.00".to_string(),
                subtype_description: String::new(),
                deduction: String::new(),
                deduction_tooltip: String::new(),
            },
        }
    }
}

/// 32 upper-case hex digits, the shape the ERP uses for request GUIDs.
fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Reduces every `Set-Cookie` header to its `name=value` pair so the result can
/// be sent back verbatim as a `Cookie` header.
pub fn harvest_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Clone, Debug)]
pub struct ErpClient {
    http: Client,
    base_url: String,
    service_path: String,
    submit_method: LeaveSubmitMethod,
    client_credentials: Option<String>,
}

impl ErpClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        if !config.sap_verify_tls {
            tracing::warn!("ERP TLS certificate verification is disabled");
        }
        let client_credentials = (!config.sap_client_id.is_empty())
            .then(|| basic_credentials(&config.sap_client_id, &config.sap_client_secret));

        Ok(Self {
            http: build_http_client(
                Duration::from_secs(config.outbound_timeout_secs),
                config.sap_verify_tls,
            )?,
            base_url: config.sap_base_url.trim_end_matches('/').to_string(),
            service_path: config.sap_leave_service_path.clone(),
            submit_method: config.sap_leave_submit_method,
            client_credentials,
        })
    }

    pub fn collection_url(&self) -> String {
        format!("{}{}", self.base_url, self.service_path)
    }

    fn entity_url(&self, request_id: &str) -> String {
        format!("{}('{}')", self.collection_url(), request_id)
    }

    pub async fn login(&self, personnel_number: &str, password: &str) -> Result<SessionToken, ErpError> {
        let basic = basic_credentials(personnel_number, password);
        let response = self
            .http
            .get(self.collection_url())
            .header(AUTHORIZATION, format!("Basic {basic}"))
            .header(CSRF_HEADER, CSRF_FETCH)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ErpError::Rejected(status));
        }

        let csrf_token = response
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let cookie = harvest_cookies(response.headers());

        Ok(SessionToken::new(personnel_number, csrf_token, basic, cookie))
    }

    pub async fn submit_leave(
        &self,
        session: &SessionToken,
        start_date: &str,
        end_date: &str,
    ) -> Result<Value, ErpError> {
        let envelope = LeaveRequestEnvelope::new(&session.personnel_number, start_date, end_date);
        let request = match self.submit_method {
            LeaveSubmitMethod::Post => self.http.post(self.collection_url()),
            LeaveSubmitMethod::Put => self.http.put(self.entity_url(&envelope.d.request_id)),
        };

        let authorization = self
            .client_credentials
            .as_deref()
            .unwrap_or(&session.basic_auth);
        let mut request = request
            .header(AUTHORIZATION, format!("Basic {authorization}"))
            .header(CSRF_HEADER, &session.csrf_token)
            .header(ACCEPT, "application/json")
            .json(&envelope);
        if !session.cookie.is_empty() {
            request = request.header(COOKIE, &session.cookie);
        }

        tracing::debug!(request_id = %envelope.d.request_id, "submitting leave request to ERP");
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(ErpError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(ErpError::Decode)
    }
}
