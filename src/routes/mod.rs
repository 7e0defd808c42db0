mod api;
mod pages;

pub use api::{download_certificate, generate_batch, verify_certificate};
pub use pages::{admin_panel, index, list_certificates, login, upload_dataset, verify_page};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(login))
        .route("/download", get(download_certificate))
        .route("/verify/:certificate_id", get(verify_page))
        .route("/api/verify/:certificate_id", get(verify_certificate))
        .route("/admin", get(admin_panel).post(upload_dataset))
        .route("/admin/certificates", get(list_certificates))
        .route("/admin/batch", post(generate_batch))
        .nest_service("/static", tower_http::services::ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
