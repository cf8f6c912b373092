pub mod modal;
pub mod profile;
pub mod transaction;
pub mod verification;
