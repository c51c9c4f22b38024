use std::sync::Arc;
use std::time::Duration;

use crate::db::{GalleryStore, JobStore, PhotoStore};
use crate::middleware::owner_auth::JwtValidator;
use crate::services::{
    gate::AccessGate,
    notify::Notifier,
    queue::WorkQueue,
    sharing::{SharingService, SharingSettings},
    storage::ObjectStorage,
};

/// External collaborators, constructed once at start-up.
pub struct Collaborators {
    pub galleries: Arc<dyn GalleryStore>,
    pub jobs: Arc<dyn JobStore>,
    pub photos: Arc<dyn PhotoStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn Notifier>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub galleries: Arc<dyn GalleryStore>,
    pub photos: Arc<dyn PhotoStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub sharing: Arc<SharingService>,
    pub gate: Arc<AccessGate>,
    pub jwt: Arc<JwtValidator>,
    pub photo_url_ttl: Duration,
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(
        collaborators: Collaborators,
        jwt: JwtValidator,
        sharing: SharingSettings,
        photo_url_ttl: Duration,
    ) -> Self {
        let store_timeout = sharing.store_timeout;
        let gate = AccessGate::new(collaborators.galleries.clone(), store_timeout);
        let sharing = SharingService::new(
            collaborators.galleries.clone(),
            collaborators.jobs,
            collaborators.notifier.clone(),
            sharing,
        );

        Self {
            galleries: collaborators.galleries,
            photos: collaborators.photos,
            queue: collaborators.queue,
            storage: collaborators.storage,
            notifier: collaborators.notifier,
            sharing: Arc::new(sharing),
            gate: Arc::new(gate),
            jwt: Arc::new(jwt),
            photo_url_ttl,
            store_timeout,
        }
    }
}
