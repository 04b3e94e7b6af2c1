//! Application services layer.

pub mod analytics;
pub mod error;
pub mod posts;
pub mod repos;
