use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::build_http_client;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
}

/// Message typed by a user in the chat client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInput {
    pub text: String,
    #[serde(default)]
    pub personnel_number: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum NlpError {
    #[error("nlp request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("nlp service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("nlp response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Clone, Debug)]
pub struct NlpClient {
    http: Client,
    base_url: String,
}

impl NlpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout, true)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn classify_url(&self) -> String {
        format!("{}/classify", self.base_url)
    }

    pub async fn classify(&self, text: &str) -> Result<IntentResponse, NlpError> {
        let response = self
            .http
            .post(self.classify_url())
            .json(&ClassifyRequest { text })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(NlpError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(NlpError::Decode)
    }
}
