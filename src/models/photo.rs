use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A photo clients may see. Stores only load photos marked shared.
#[derive(Debug, Clone)]
pub struct Photo {
    pub id: Uuid,
    pub gallery_id: Uuid,
    pub original_filename: String,
    pub object_key: String,
    pub client_object_key: String,
    pub thumbnail_object_key: String,
    pub created_at: DateTime<Utc>,
}

/// Photo as returned to a client, with short-lived download URLs.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPhotoResponse {
    pub id: Uuid,
    pub original_filename: String,
    pub url: String,
    pub thumbnail_url: String,
}

/// Print order placed by a client.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[garde(length(min = 3, max = 320), contains("@"))]
    pub client_email: String,

    #[serde(default)]
    #[garde(length(max = 2000))]
    pub comment: String,

    #[garde(length(min = 1, max = 500))]
    pub photo_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub id: Uuid,
}
