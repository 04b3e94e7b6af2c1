//! Infrastructure adapters: Postgres, key-value stores and telemetry.

pub mod db;
pub mod error;
pub mod kv;
pub mod telemetry;
