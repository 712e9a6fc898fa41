//! In-process implementations of the store traits. Used when Redis or
//! Postgres are not configured and throughout the test suites.

mod cache;
mod store;
mod users;

pub use cache::MemoryTripCache;
pub use store::MemoryStore;
pub use users::MemoryUserDirectory;

#[derive(Debug)]
pub struct Unavailable(pub &'static str);

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} unavailable", self.0)
    }
}

impl std::error::Error for Unavailable {}
