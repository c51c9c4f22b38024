use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::middleware::owner_auth::Owner;
use crate::models::gallery::Gallery;
use crate::models::sharing::{ShareResponse, SharingRequest};
use crate::routes::error::ApiError;

/// POST /api/v1/galleries/{gallery_id}/sharing/share: open a sharing window.
pub async fn share_gallery(
    State(state): State<AppState>,
    owner: Owner,
    Path(gallery_id): Path<Uuid>,
    payload: Result<Json<SharingRequest>, JsonRejection>,
) -> Result<Json<ShareResponse>, ApiError> {
    let Json(request) = payload?;

    let response = state
        .sharing
        .activate(gallery_id, &owner.user_id, request.sharing_expiry, Utc::now())
        .await?;

    Ok(Json(response))
}

/// PUT /api/v1/galleries/{gallery_id}/sharing/reschedule: move the end of the window.
pub async fn reschedule_sharing(
    State(state): State<AppState>,
    owner: Owner,
    Path(gallery_id): Path<Uuid>,
    payload: Result<Json<SharingRequest>, JsonRejection>,
) -> Result<Json<ShareResponse>, ApiError> {
    let Json(request) = payload?;

    let response = state
        .sharing
        .reschedule(gallery_id, &owner.user_id, request.sharing_expiry, Utc::now())
        .await?;

    Ok(Json(response))
}

/// PUT /api/v1/galleries/{gallery_id}/sharing/stop: revoke access now.
pub async fn stop_sharing(
    State(state): State<AppState>,
    owner: Owner,
    Path(gallery_id): Path<Uuid>,
) -> Result<Json<Gallery>, ApiError> {
    let gallery = state
        .sharing
        .stop(gallery_id, &owner.user_id, Utc::now())
        .await?;

    Ok(Json(gallery))
}
