use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::StoreError;
use crate::models::gallery::{Gallery, Sharing, SharingPrecondition, SharingUpdate};

const GALLERY_COLUMNS: &str = "id, collection_id, user_id, name, created_at, updated_at, \
     sharing_enabled, sharing_access_token, sharing_expiry_date, sharing_url, sharing_cleanup_job_id";

/// Persistence of gallery documents, as far as the sharing lifecycle needs it.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Resolve a gallery by id with no owner scoping.
    async fn get_gallery(&self, gallery_id: Uuid) -> Result<Option<Gallery>, StoreError>;

    /// Apply `update` only if `precondition` holds, as a single atomic write.
    ///
    /// Returns the updated gallery, or `None` when the gallery does not exist
    /// or the precondition did not hold.
    async fn update_sharing(
        &self,
        gallery_id: Uuid,
        update: &SharingUpdate,
        precondition: SharingPrecondition,
    ) -> Result<Option<Gallery>, StoreError>;

    /// Check connectivity (for health checks).
    async fn ping(&self) -> Result<(), StoreError>;
}

pub struct PgGalleryStore {
    pool: PgPool,
}

impl PgGalleryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn gallery_from_row(row: &PgRow) -> Result<Gallery, sqlx::Error> {
    Ok(Gallery {
        id: row.try_get("id")?,
        collection_id: row.try_get("collection_id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        sharing: Sharing {
            sharing_enabled: row.try_get("sharing_enabled")?,
            access_token: row.try_get("sharing_access_token")?,
            sharing_expiry_date: row.try_get("sharing_expiry_date")?,
            sharing_url: row.try_get("sharing_url")?,
            sharing_cleanup_job_id: row.try_get("sharing_cleanup_job_id")?,
        },
    })
}

fn push_set_clause(qb: &mut QueryBuilder<'_, Postgres>, update: &SharingUpdate) {
    match update {
        SharingUpdate::Activate {
            access_token,
            expiry,
            sharing_url,
            cleanup_job_id,
        } => {
            qb.push("sharing_enabled = TRUE, sharing_access_token = ")
                .push_bind(access_token.clone())
                .push(", sharing_expiry_date = ")
                .push_bind(*expiry)
                .push(", sharing_url = ")
                .push_bind(sharing_url.clone())
                .push(", sharing_cleanup_job_id = ")
                .push_bind(*cleanup_job_id);
        }
        SharingUpdate::Reschedule { expiry } => {
            qb.push("sharing_expiry_date = ").push_bind(*expiry);
        }
        SharingUpdate::Disable => {
            qb.push(
                "sharing_enabled = FALSE, sharing_access_token = NULL, sharing_expiry_date = NULL, \
                 sharing_url = NULL, sharing_cleanup_job_id = NULL",
            );
        }
    }
}

// Mirrors `SharingPrecondition::holds`.
fn push_precondition(qb: &mut QueryBuilder<'_, Postgres>, precondition: SharingPrecondition) {
    match precondition {
        SharingPrecondition::NotShared { now } => {
            qb.push(
                " AND (NOT sharing_enabled OR (sharing_expiry_date IS NOT NULL AND sharing_expiry_date < ",
            )
            .push_bind(now)
            .push("))");
        }
        SharingPrecondition::Shared {
            now,
            cleanup_job_id,
        } => {
            qb.push(" AND sharing_enabled AND (sharing_expiry_date IS NULL OR sharing_expiry_date >= ")
                .push_bind(now)
                .push(") AND sharing_cleanup_job_id IS NOT DISTINCT FROM ")
                .push_bind(cleanup_job_id);
        }
        SharingPrecondition::Enabled => {
            qb.push(" AND sharing_enabled");
        }
        SharingPrecondition::CleanupDue {
            cleanup_job_id,
            now,
        } => {
            qb.push(" AND sharing_enabled AND sharing_cleanup_job_id = ")
                .push_bind(cleanup_job_id)
                .push(" AND sharing_expiry_date <= ")
                .push_bind(now);
        }
    }
}

#[async_trait]
impl GalleryStore for PgGalleryStore {
    async fn get_gallery(&self, gallery_id: Uuid) -> Result<Option<Gallery>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {GALLERY_COLUMNS} FROM galleries WHERE id = $1"
        ))
        .bind(gallery_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(gallery_from_row).transpose()?)
    }

    async fn update_sharing(
        &self,
        gallery_id: Uuid,
        update: &SharingUpdate,
        precondition: SharingPrecondition,
    ) -> Result<Option<Gallery>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE galleries SET ");
        push_set_clause(&mut qb, update);
        qb.push(", updated_at = NOW() WHERE id = ").push_bind(gallery_id);
        push_precondition(&mut qb, precondition);
        qb.push(" RETURNING ").push(GALLERY_COLUMNS);

        let row = qb.build().fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(gallery_from_row).transpose()?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
