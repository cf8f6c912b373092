// Re-export modules
pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod security;
pub mod utils;
pub mod wallet;

pub use config::Config;
pub use security::{SecurityError, TransactionSecurityService};
