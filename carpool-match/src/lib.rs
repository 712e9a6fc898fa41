//! Candidate search, scoring, two-sided confirmation and the notification inbox.

pub mod engine;
pub mod notifications;
pub mod scoring;
pub mod service;

pub use engine::{MatchEngine, MatchRun};
pub use notifications::NotificationService;
pub use service::MatchService;
