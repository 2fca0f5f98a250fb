//! tc-core: shared errors, configuration, and the external tool data model.
//!
//! This crate is the foundational dependency for the other tc-* crates. It
//! carries no I/O beyond reading a configuration file and the process
//! environment.

pub mod config;
pub mod error;
pub mod tool;

// Re-export the most commonly used items at the crate root.
pub use config::{Config, ToolchainConfig, TransformConfig};
pub use error::{Error, Result};
pub use tool::*;
