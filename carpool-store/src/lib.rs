pub mod app_config;
pub mod database;
pub mod match_repo;
pub mod memory;
pub mod notification_repo;
pub mod redis_repo;
pub mod trip_cache;
pub mod trip_repo;
pub mod user_directory;

pub use database::DbClient;
pub use match_repo::StoreMatchRepository;
pub use notification_repo::StoreNotificationRepository;
pub use redis_repo::RedisClient;
pub use trip_cache::RedisTripCache;
pub use trip_repo::StoreTripRepository;
pub use user_directory::StoreUserDirectory;
