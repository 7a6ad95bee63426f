// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section in `uniform_spatial.toml`. Missing keys fall
//! back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub grid: GridConfig,
    pub logging: LoggingConfig,
}

/// Grid geometry and bucket sizing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    /// Edge length of one cubic cell, in world units
    pub cell_size: f32,
    /// Cells along x, y and z
    pub cell_count_per_axis: [i32; 3],
    /// Multiplier applied to a cell's demand when it overflowed last tick
    pub grow_factor: f32,
    pub initial_capacity_per_cell: u32,
}

impl GridConfig {
    /// Total number of cells, or `None` if an axis is not positive
    pub fn total_cells(&self) -> Option<u64> {
        self.cell_count_per_axis.iter().try_fold(1u64, |acc, &n| {
            if n > 0 {
                acc.checked_mul(n as u64)
            } else {
                None
            }
        })
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            cell_count_per_axis: [32, 8, 32],
            grow_factor: 1.5,
            initial_capacity_per_cell: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
    pub file_logging: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}
