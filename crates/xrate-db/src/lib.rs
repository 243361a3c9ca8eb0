pub mod config;
pub mod database;
pub mod queue_repository;
pub mod rate_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use queue_repository::PgQueueTransport;
pub use rate_repository::RateRepository;
