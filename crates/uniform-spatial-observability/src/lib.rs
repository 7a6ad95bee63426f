// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # uniform-spatial-observability
//!
//! Logging setup shared by the uniform spatial crates, with per-crate debug
//! flag support.
//!
//! ## Features
//! - `file-logging`: per-run log folders with daily rotation

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Crate names accepted by the debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "uniform-spatial",
    "uniform-spatial-core",
    "uniform-spatial-config",
    "uniform-spatial-observability",
];

/// Tracing target for a crate name (`uniform-spatial-core` -> `uniform_spatial_core`)
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
