//! # Pictor Common Library
//!
//! Shared code for the Pictor annotation service including:
//! - Error types
//! - Configuration loading and resolution
//! - Pipeline event types and EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
