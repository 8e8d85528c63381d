pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod idempotency_repo;
pub mod memory;
pub mod recon_log_repo;
pub mod seatmap_repo;

pub use app_config::Config;
pub use database::DbClient;
