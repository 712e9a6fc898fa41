pub mod cache_aside;
pub mod service;

pub use cache_aside::TripCacheAside;
pub use service::{GrabOutcome, GrabberView, TripDetail, TripRules, TripService, UpdateOutcome};
