pub mod cache;
pub mod identity;
pub mod repository;
pub mod search;

pub use cache::TripCache;
pub use identity::{UserDirectory, UserProfile};
pub use repository::{MatchRepository, NotificationRepository, TripRepository};
pub use search::TripListQuery;

/// Error type returned by store and cache implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Already done: {0}")]
    AlreadyDone(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Store unavailable: {0}")]
    Transient(String),
}

impl From<BoxError> for CoreError {
    fn from(err: BoxError) -> Self {
        CoreError::Transient(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Receives every successfully created trip for background matching.
/// Implementations must return immediately.
pub trait MatchTrigger: Send + Sync {
    fn submit(&self, trip: carpool_shared::Trip);
}
