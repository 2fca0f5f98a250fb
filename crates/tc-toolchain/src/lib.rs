//! # tc-toolchain
//!
//! Self-healing management of the external binaries trendclip depends on.
//!
//! This crate provides:
//!
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout and
//!   cancellation support for running external processes.
//! - **Checksum verification** ([`checksum`]) -- streaming file digests and
//!   policy-driven comparison against an expected digest.
//! - **Tool probing** ([`ToolProbe`]) -- live execution checks against the
//!   override, managed directory and `PATH` candidates.
//! - **Installation** ([`Installer`]) -- download, verify, extract, relocate
//!   and re-probe a tool into the managed tools directory.
//! - **Orchestration** ([`Toolchain`]) -- idempotent `ensure`, concurrent
//!   bulk healing, and path resolution for other components.

pub mod checksum;
pub mod command;
pub mod download;
pub mod env_script;
pub mod extract;
pub mod installer;
pub mod manager;
pub mod probe;

// ---- Re-exports for convenience ----

pub use checksum::{digest, verify, VerificationOutcome};
pub use command::{ToolCommand, ToolOutput};
pub use download::{DownloadProgress, Downloader};
pub use installer::{Installer, ProgressFn};
pub use manager::{HealOutcome, Toolchain};
pub use probe::{companion, ToolProbe};
