pub mod memory;
pub mod postgres;

use {
    crate::domain::store::{AttemptLog, DonationStore, JobQueue},
    std::sync::Arc,
};

/// One backing store seen through each of its ports.
#[derive(Clone)]
pub struct Stores {
    pub donations: Arc<dyn DonationStore>,
    pub jobs: Arc<dyn JobQueue>,
    pub attempts: Arc<dyn AttemptLog>,
}

impl Stores {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: DonationStore + JobQueue + AttemptLog + 'static,
    {
        Self {
            donations: store.clone(),
            jobs: store.clone(),
            attempts: store,
        }
    }
}
