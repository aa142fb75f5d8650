mod validate;
mod verify;

pub use validate::*;
pub use verify::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Public certificate lookup by verification code, no auth
        .route("/verify/{code}", get(verify_credential))
        .route(
            "/api/product-license/validate",
            post(validate_product_license),
        )
}
