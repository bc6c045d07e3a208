//! # VSS Common Library
//!
//! Shared code for the Variant Subscription Service crates:
//! - Domain models (variants, classifications, users, ingestion runs)
//! - Store traits and their SQLite implementation
//! - Configuration loading and root folder resolution
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
