use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A gallery with its embedded sharing attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sharing: Sharing,
}

/// Sharing attributes of a gallery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sharing {
    pub sharing_enabled: bool,
    pub access_token: Option<String>,
    /// Inclusive end of the sharing window. `None` means never shared.
    pub sharing_expiry_date: Option<DateTime<Utc>>,
    pub sharing_url: Option<String>,
    /// Weak reference to the cleanup job; the job is not owned by the gallery.
    pub sharing_cleanup_job_id: Option<Uuid>,
}

/// Lifecycle state of a gallery's sharing window, derived at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SharingState {
    Unshared,
    Shared,
    Expired,
}

impl Sharing {
    pub fn state(&self, now: DateTime<Utc>) -> SharingState {
        if !self.sharing_enabled {
            return SharingState::Unshared;
        }
        match self.sharing_expiry_date {
            Some(expiry) if expiry < now => SharingState::Expired,
            _ => SharingState::Shared,
        }
    }
}

/// Typed partial update of the sharing fields, applied as one write.
#[derive(Debug, Clone, PartialEq)]
pub enum SharingUpdate {
    Activate {
        access_token: String,
        expiry: DateTime<Utc>,
        sharing_url: String,
        cleanup_job_id: Uuid,
    },
    Reschedule {
        expiry: DateTime<Utc>,
    },
    /// Turns sharing off and clears token, url, expiry and job reference.
    Disable,
}

impl SharingUpdate {
    pub fn apply(&self, sharing: &mut Sharing) {
        match self {
            SharingUpdate::Activate {
                access_token,
                expiry,
                sharing_url,
                cleanup_job_id,
            } => {
                sharing.sharing_enabled = true;
                sharing.access_token = Some(access_token.clone());
                sharing.sharing_expiry_date = Some(*expiry);
                sharing.sharing_url = Some(sharing_url.clone());
                sharing.sharing_cleanup_job_id = Some(*cleanup_job_id);
            }
            SharingUpdate::Reschedule { expiry } => {
                sharing.sharing_expiry_date = Some(*expiry);
            }
            SharingUpdate::Disable => *sharing = Sharing::default(),
        }
    }
}

/// Condition a gallery's current sharing fields must satisfy for an update
/// to be written. Stores evaluate it atomically with the write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SharingPrecondition {
    /// State is `Unshared` or `Expired` at `now`.
    NotShared { now: DateTime<Utc> },
    /// State is `Shared` at `now` and the gallery still references `cleanup_job_id`.
    Shared {
        now: DateTime<Utc>,
        cleanup_job_id: Option<Uuid>,
    },
    /// Sharing is enabled, whether or not the window has lapsed.
    Enabled,
    /// Sharing is enabled, references `cleanup_job_id` and the expiry is at or before `now`.
    CleanupDue {
        cleanup_job_id: Uuid,
        now: DateTime<Utc>,
    },
}

impl SharingPrecondition {
    pub fn holds(&self, sharing: &Sharing) -> bool {
        match *self {
            SharingPrecondition::NotShared { now } => sharing.state(now) != SharingState::Shared,
            SharingPrecondition::Shared {
                now,
                cleanup_job_id,
            } => {
                sharing.state(now) == SharingState::Shared
                    && sharing.sharing_cleanup_job_id == cleanup_job_id
            }
            SharingPrecondition::Enabled => sharing.sharing_enabled,
            SharingPrecondition::CleanupDue {
                cleanup_job_id,
                now,
            } => {
                sharing.sharing_enabled
                    && sharing.sharing_cleanup_job_id == Some(cleanup_job_id)
                    && sharing.sharing_expiry_date.is_some_and(|expiry| expiry <= now)
            }
        }
    }
}
