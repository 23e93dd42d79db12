//! Common Utilities and Types Library
//!
//! This crate provides shared identifiers, slot timing and table helpers used
//! across the scheduler workspace.

pub mod types;
pub mod utils;

// Re-export commonly used items
pub use types::*;
pub use utils::*;
