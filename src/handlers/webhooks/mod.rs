pub mod bransjekurs;

pub use bransjekurs::handle_bransjekurs_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/bransjekurs", post(handle_bransjekurs_webhook))
}
