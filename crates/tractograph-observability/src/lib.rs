// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # tractograph-observability
//!
//! Logging and progress reporting for the tractograph crates.
//!
//! Provides consistent observability patterns across all tractograph crates
//! with per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files in per-run folders with retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;
pub mod progress;

// Re-export commonly used items
pub use cli::*;
pub use init::*;
pub use progress::*;

/// Known tractograph crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "tractograph",
    "tractograph-config",
    "tractograph-observability",
    "tractograph-structures",
    "tractograph-serialization",
    "tractograph-connectome",
];
