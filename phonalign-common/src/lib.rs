//! # phonalign common library
//!
//! Shared code for the phonalign workspace:
//! - Error types
//! - TOML configuration model, loading and path resolution
//! - Logging setup

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
