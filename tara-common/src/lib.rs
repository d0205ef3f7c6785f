// tara-common/src/lib.rs

pub mod error;
pub mod models;
pub mod traits;
pub mod config;

pub use error::Error;
