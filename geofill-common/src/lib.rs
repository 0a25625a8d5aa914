//! # geofill Common Library
//!
//! Shared code for the geofill workspace:
//! - Error type used across crates
//! - TOML configuration model and discovery
//! - Credential resolution for the vision service

pub mod config;
pub mod error;

pub use error::{Error, Result};
