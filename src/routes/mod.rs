pub mod client;
pub mod error;
pub mod health;
pub mod metrics;
pub mod sharing;

use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::middleware::client_access::require_client_access;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// API routes with their middleware. `/metrics` is mounted by the binary.
pub fn build_router(state: AppState) -> Router {
    let owner = Router::new()
        .route(
            "/api/v1/galleries/{gallery_id}/sharing/share",
            post(sharing::share_gallery),
        )
        .route(
            "/api/v1/galleries/{gallery_id}/sharing/reschedule",
            put(sharing::reschedule_sharing),
        )
        .route(
            "/api/v1/galleries/{gallery_id}/sharing/stop",
            put(sharing::stop_sharing),
        );

    let client = Router::new()
        .route(
            "/api/v1/client/galleries/{gallery_id}",
            get(client::get_gallery).post(client::create_order),
        )
        .route(
            "/api/v1/client/galleries/{gallery_id}/photos",
            get(client::list_photos),
        )
        .route(
            "/api/v1/client/galleries/{gallery_id}/photos/{photo_id}",
            get(client::get_photo),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_client_access,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(owner)
        .merge(client)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}
