use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::compression::CompressionLayer;

use crate::{
    error::AppError,
    middleware::{access_log, cors_layer, rate_limit},
    state::AppState,
};

pub mod auth;
pub mod classify;
pub mod health;
pub mod leave_requests;
pub mod purchase_requests;
pub mod sap;
pub mod users;

pub const API_PREFIX: &str = "/api/v1";

async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

async fn not_found() -> AppError {
    AppError::not_found("Not found")
}

/// Answers verbs the route does not serve with the JSON 405 envelope.
fn resource(methods: MethodRouter<AppState>) -> MethodRouter<AppState> {
    methods.fallback(method_not_allowed)
}

pub fn create_router(state: AppState) -> Result<Router<()>> {
    let cors = cors_layer(&state.config.allowed_origin)?;
    let rate_limiter = state.rate_limiter.clone();

    let api_routes = Router::new()
        .route("/login", resource(post(auth::login)))
        .route("/classify", resource(post(classify::classify_intent)))
        .route("/users", resource(post(users::create_user)))
        .route(
            "/users/:id",
            resource(
                get(users::get_user)
                    .put(users::update_user)
                    .delete(users::delete_user),
            ),
        )
        .route(
            "/users/:id/leave-requests",
            resource(get(leave_requests::list_for_user)),
        )
        .route(
            "/users/:id/purchase-requests",
            resource(get(purchase_requests::list_for_user)),
        )
        .route(
            "/leave-requests",
            resource(post(leave_requests::create_leave_request)),
        )
        .route(
            "/leave-requests/:id",
            resource(
                get(leave_requests::get_leave_request)
                    .put(leave_requests::update_leave_request)
                    .delete(leave_requests::delete_leave_request),
            ),
        )
        .route(
            "/purchase-requests",
            resource(post(purchase_requests::create_purchase_request)),
        )
        .route(
            "/purchase-requests/:id",
            resource(
                get(purchase_requests::get_purchase_request)
                    .put(purchase_requests::update_purchase_request)
                    .delete(purchase_requests::delete_purchase_request),
            ),
        )
        .route(
            "/sap/leave-requests",
            resource(post(sap::send_leave_request)),
        );

    Ok(Router::new()
        .route("/health", resource(get(health::health_check)))
        .nest(API_PREFIX, api_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit))
        .layer(cors)
        .layer(middleware::from_fn(access_log)))
}
