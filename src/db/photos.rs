use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::StoreError;
use crate::models::photo::Photo;

const PHOTO_COLUMNS: &str = "id, gallery_id, original_filename, object_key, \
     client_object_key, thumbnail_object_key, created_at";

/// Photo and order queries used by the client-facing routes.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn list_shared_photos(&self, gallery_id: Uuid) -> Result<Vec<Photo>, StoreError>;

    async fn get_photo(&self, photo_id: Uuid) -> Result<Option<Photo>, StoreError>;

    /// True when every id in `photo_ids` belongs to the gallery.
    async fn photos_in_gallery(&self, gallery_id: Uuid, photo_ids: &[Uuid]) -> Result<bool, StoreError>;

    /// Create the gallery's order. Returns `None` when the gallery already has
    /// one; the check and the insert are a single atomic step.
    async fn create_order(
        &self,
        gallery_id: Uuid,
        client_email: &str,
        comment: &str,
        photo_ids: &[Uuid],
    ) -> Result<Option<Uuid>, StoreError>;
}

pub struct PgPhotoStore {
    pool: PgPool,
}

impl PgPhotoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn photo_from_row(row: &PgRow) -> Result<Photo, StoreError> {
    Ok(Photo {
        id: row.try_get("id")?,
        gallery_id: row.try_get("gallery_id")?,
        original_filename: row.try_get("original_filename")?,
        object_key: row.try_get("object_key")?,
        client_object_key: row.try_get("client_object_key")?,
        thumbnail_object_key: row.try_get("thumbnail_object_key")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PhotoStore for PgPhotoStore {
    async fn list_shared_photos(&self, gallery_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PHOTO_COLUMNS}
            FROM photos
            WHERE gallery_id = $1 AND status = 'shared'
            ORDER BY created_at ASC
            "#
        ))
        .bind(gallery_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(photo_from_row).collect()
    }

    async fn get_photo(&self, photo_id: Uuid) -> Result<Option<Photo>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id = $1 AND status = 'shared'"
        ))
        .bind(photo_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(photo_from_row).transpose()
    }

    async fn photos_in_gallery(&self, gallery_id: Uuid, photo_ids: &[Uuid]) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT id) FROM photos WHERE gallery_id = $1 AND id = ANY($2)",
        )
        .bind(gallery_id)
        .bind(photo_ids)
        .fetch_one(&self.pool)
        .await?;

        let mut distinct = photo_ids.to_vec();
        distinct.sort();
        distinct.dedup();
        Ok(count == distinct.len() as i64)
    }

    async fn create_order(
        &self,
        gallery_id: Uuid,
        client_email: &str,
        comment: &str,
        photo_ids: &[Uuid],
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (gallery_id, client_email, comment, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (gallery_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(gallery_id)
        .bind(client_email)
        .bind(comment)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = order_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO order_photos (order_id, photo_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(order_id)
        .bind(photo_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(order_id))
    }
}
