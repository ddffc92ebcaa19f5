//! Outbound HTTP integrations. Each upstream gets one shared `reqwest::Client`.

pub mod erp;
pub mod nlp;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub use erp::{ErpClient, ErpError};
pub use nlp::{IntentResponse, NlpClient, NlpError, UserInput};

pub(crate) fn build_http_client(timeout: Duration, verify_tls: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .context("failed to build HTTP client")
}
