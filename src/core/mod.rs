pub mod types;
pub mod table_ref;
pub mod json;
pub mod database;
pub mod config;
pub mod error;
