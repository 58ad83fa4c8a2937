use axum::{Router, routing::post};

pub mod system;
pub mod webhooks;

/// Router for the ingress endpoints.
pub fn router() -> Router {
    Router::new().route(
        "/send",
        post(webhooks::send).fallback(system::method_not_allowed),
    )
}
