//! Client-facing gallery routes. Every handler runs behind the access gate,
//! which places the resolved gallery in the request extensions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::gallery::Gallery;
use crate::models::photo::{ClientPhotoResponse, CreateOrderRequest, CreateOrderResponse, Photo};
use crate::models::sharing::ClientGalleryResponse;
use crate::routes::error::ApiError;
use crate::services::deadline::within;

/// GET /api/v1/client/galleries/{gallery_id}
pub async fn get_gallery(Extension(gallery): Extension<Gallery>) -> Json<ClientGalleryResponse> {
    Json(ClientGalleryResponse::from(&gallery))
}

/// GET /api/v1/client/galleries/{gallery_id}/photos
pub async fn list_photos(
    State(state): State<AppState>,
    Extension(gallery): Extension<Gallery>,
) -> Result<Json<Vec<ClientPhotoResponse>>, ApiError> {
    let photos = within(
        state.store_timeout,
        "list photos",
        state.photos.list_shared_photos(gallery.id),
    )
    .await??;

    let mut response = Vec::with_capacity(photos.len());
    for photo in &photos {
        response.push(client_photo(&state, photo).await?);
    }

    Ok(Json(response))
}

/// GET /api/v1/client/galleries/{gallery_id}/photos/{photo_id}
pub async fn get_photo(
    State(state): State<AppState>,
    Extension(gallery): Extension<Gallery>,
    Path((_, photo_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ClientPhotoResponse>, ApiError> {
    let photo = within(state.store_timeout, "load photo", state.photos.get_photo(photo_id))
        .await??
        .filter(|photo| photo.gallery_id == gallery.id)
        .ok_or_else(|| ApiError::NotFound("Photo not found".to_string()))?;

    Ok(Json(client_photo(&state, &photo).await?))
}

/// POST /api/v1/client/galleries/{gallery_id}: place the gallery's print order.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(gallery): Extension<Gallery>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let owned = within(
        state.store_timeout,
        "check photos",
        state.photos.photos_in_gallery(gallery.id, &request.photo_ids),
    )
    .await??;
    if !owned {
        return Err(ApiError::Validation(
            "Every photo must belong to the gallery".to_string(),
        ));
    }

    let order_id = within(
        state.store_timeout,
        "create order",
        state.photos.create_order(
            gallery.id,
            &request.client_email,
            &request.comment,
            &request.photo_ids,
        ),
    )
    .await??
    .ok_or_else(|| ApiError::Validation("An order already exists for this gallery".to_string()))?;

    metrics::counter!("gallery_orders_created_total").increment(1);
    tracing::info!(gallery_id = %gallery.id, order_id = %order_id, "Order created");

    let body = format!("A new order has been placed for gallery {}.", gallery.name);
    match within(
        state.store_timeout,
        "send notification",
        state.notifier.notify(&gallery.user_id, "New order", &body),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(order_id = %order_id, error = %e, "Failed to send push notification"),
        Err(e) => tracing::warn!(order_id = %order_id, error = %e, "Failed to send push notification"),
    }

    Ok((StatusCode::CREATED, Json(CreateOrderResponse { id: order_id })))
}

async fn client_photo(state: &AppState, photo: &Photo) -> Result<ClientPhotoResponse, ApiError> {
    let key = if photo.client_object_key.is_empty() {
        &photo.object_key
    } else {
        &photo.client_object_key
    };
    let url = state.storage.presigned_get(key, state.photo_url_ttl).await?;

    let thumbnail_url = if photo.thumbnail_object_key.is_empty() {
        url.clone()
    } else {
        state
            .storage
            .presigned_get(&photo.thumbnail_object_key, state.photo_url_ttl)
            .await?
    };

    Ok(ClientPhotoResponse {
        id: photo.id,
        original_filename: photo.original_filename.clone(),
        url,
        thumbnail_url,
    })
}
