use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{error::AppError, ratelimit::RateLimiter};

const UNKNOWN_CLIENT: &str = "unknown";

pub async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();
    tracing::info!(%method, %path, "started request");

    let response = next.run(request).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "completed request"
    );
    response
}

pub async fn rate_limit(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    if !limiter.allow(&key).await {
        tracing::warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
        return AppError::too_many_requests().into_response();
    }
    next.run(request).await
}

/// Peer IP without the port, so every connection from one host shares a bucket.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Single-origin CORS policy. Every `OPTIONS` request is answered here with 200.
pub fn cors_layer(allowed_origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(allowed_origin.trim())
        .with_context(|| format!("ALLOWED_ORIGIN {allowed_origin:?} is not a valid header value"))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}
