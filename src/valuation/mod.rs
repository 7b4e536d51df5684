pub mod client;
pub mod config;
pub mod models;

pub use client::{ValuationClient, ValuationError};
pub use config::ValuationConfig;
