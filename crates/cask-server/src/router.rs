use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all gateway endpoints.
///
/// Anything that does not match falls through to axum's default empty-body
/// 404.
pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    Router::new()
        .route("/", get(handler::storage_root))
        .route(
            "/:object_id/files",
            get(handler::list_files)
                .post(handler::create_object)
                .put(handler::update_object),
        )
        .route("/:object_id/files/*tail", get(handler::file_content))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
