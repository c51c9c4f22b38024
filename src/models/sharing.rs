use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::gallery::Gallery;

/// Body of the share and reschedule requests.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingRequest {
    /// example: "2024-12-31T23:59:59Z"
    pub sharing_expiry: DateTime<Utc>,
}

/// Result of a successful activation or reschedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub gallery_id: Uuid,
    pub access_token: String,
    pub share_url: String,
    pub sharing_expiry: DateTime<Utc>,
}

/// Gallery as seen by a client holding the access token.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientGalleryResponse {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub name: String,
    pub sharing_expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Gallery> for ClientGalleryResponse {
    fn from(gallery: &Gallery) -> Self {
        Self {
            id: gallery.id,
            collection_id: gallery.collection_id,
            name: gallery.name.clone(),
            sharing_expiry_date: gallery.sharing.sharing_expiry_date,
            created_at: gallery.created_at,
            updated_at: gallery.updated_at,
        }
    }
}
