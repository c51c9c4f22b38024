use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::db::{GalleryStore, StoreError};
use crate::models::gallery::{Gallery, Sharing};
use crate::services::deadline::{within, DeadlineExceeded};

/// Why a client was refused access to a gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum AccessDenied {
    SharingDisabled,
    InvalidToken,
    Expired,
}

/// Decide whether `token` opens the gallery at `now`.
///
/// Granted iff sharing is enabled, the token equals the stored one, and the
/// expiry is unset or not yet passed. The expiry is checked here on every
/// request, so access ends on time even when the cleanup job runs late.
pub fn evaluate(sharing: &Sharing, token: &str, now: DateTime<Utc>) -> Result<(), AccessDenied> {
    if !sharing.sharing_enabled {
        return Err(AccessDenied::SharingDisabled);
    }

    match sharing.access_token.as_deref() {
        Some(stored) if !token.is_empty() && bool::from(stored.as_bytes().ct_eq(token.as_bytes())) => {}
        _ => return Err(AccessDenied::InvalidToken),
    }

    match sharing.sharing_expiry_date {
        Some(expiry) if now > expiry => Err(AccessDenied::Expired),
        _ => Ok(()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Gallery not found")]
    NotFound,

    #[error("Access denied: {0}")]
    Denied(AccessDenied),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Authorizes client requests against a gallery's sharing state.
pub struct AccessGate {
    galleries: Arc<dyn GalleryStore>,
    store_timeout: Duration,
}

impl AccessGate {
    pub fn new(galleries: Arc<dyn GalleryStore>, store_timeout: Duration) -> Self {
        Self {
            galleries,
            store_timeout,
        }
    }

    /// Load the gallery and check the token. On success the loaded gallery is
    /// handed to the request.
    pub async fn authorize(
        &self,
        gallery_id: Uuid,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Gallery, GateError> {
        let gallery = within(
            self.store_timeout,
            "load gallery",
            self.galleries.get_gallery(gallery_id),
        )
        .await??
        .ok_or(GateError::NotFound)?;

        if let Err(reason) = evaluate(&gallery.sharing, token, now) {
            metrics::counter!("gallery_access_denied_total", "reason" => reason.as_ref().to_string())
                .increment(1);
            return Err(GateError::Denied(reason));
        }

        Ok(gallery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn shared(token: &str, expiry: Option<DateTime<Utc>>) -> Sharing {
        Sharing {
            sharing_enabled: true,
            access_token: Some(token.to_string()),
            sharing_expiry_date: expiry,
            sharing_url: None,
            sharing_cleanup_job_id: None,
        }
    }

    #[test]
    fn test_grants_matching_token_inside_window() {
        let now = Utc::now();
        let sharing = shared("secret", Some(now + ChronoDuration::hours(1)));
        assert_eq!(evaluate(&sharing, "secret", now), Ok(()));
    }

    #[test]
    fn test_grants_at_exact_expiry() {
        let now = Utc::now();
        let sharing = shared("secret", Some(now));
        assert_eq!(evaluate(&sharing, "secret", now), Ok(()));
    }

    #[test]
    fn test_denies_after_expiry_even_if_still_enabled() {
        let now = Utc::now();
        let sharing = shared("secret", Some(now - ChronoDuration::seconds(1)));
        assert_eq!(evaluate(&sharing, "secret", now), Err(AccessDenied::Expired));
    }

    #[test]
    fn test_unset_expiry_does_not_expire() {
        let sharing = shared("secret", None);
        assert_eq!(evaluate(&sharing, "secret", Utc::now()), Ok(()));
    }

    #[test]
    fn test_denies_wrong_or_empty_token() {
        let now = Utc::now();
        let sharing = shared("secret", Some(now + ChronoDuration::hours(1)));
        assert_eq!(evaluate(&sharing, "other!", now), Err(AccessDenied::InvalidToken));
        assert_eq!(evaluate(&sharing, "", now), Err(AccessDenied::InvalidToken));
    }

    #[test]
    fn test_denies_prefix_and_extended_tokens() {
        let now = Utc::now();
        let sharing = shared("secret", None);
        assert_eq!(evaluate(&sharing, "secre", now), Err(AccessDenied::InvalidToken));
        assert_eq!(evaluate(&sharing, "secret-and-more", now), Err(AccessDenied::InvalidToken));
        assert_eq!(evaluate(&sharing, "SECRET", now), Err(AccessDenied::InvalidToken));
    }

    #[test]
    fn test_disabled_checked_before_token() {
        let sharing = Sharing::default();
        assert_eq!(
            evaluate(&sharing, "anything", Utc::now()),
            Err(AccessDenied::SharingDisabled)
        );
    }

    #[test]
    fn test_denial_labels() {
        assert_eq!(AccessDenied::SharingDisabled.as_ref(), "sharing_disabled");
        assert_eq!(AccessDenied::Expired.to_string(), "expired");
    }
}
