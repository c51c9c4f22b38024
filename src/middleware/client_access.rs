use std::collections::HashMap;

use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::middleware::owner_auth::bearer_token;
use crate::routes::error::ApiError;

/// Gate for the client-facing gallery routes.
///
/// Checked on every request. On success the resolved gallery is stored in
/// the request extensions for the handlers.
pub async fn require_client_access(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let gallery_id = params
        .get("gallery_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| ApiError::Validation("Invalid gallery id".to_string()))?;

    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing access token".to_string()))?
        .to_string();

    let gallery = state.gate.authorize(gallery_id, &token, Utc::now()).await?;
    request.extensions_mut().insert(gallery);

    Ok(next.run(request).await)
}
