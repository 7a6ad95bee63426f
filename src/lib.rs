// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Uniform Spatial
//!
//! Uniform-grid spatial index for simulations that re-index every entity each
//! tick and then run many box queries against the result.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! uniform-spatial = "0.1"
//! ```
//!
//! ## Feature Flags
//!
//! - **`file-logging`**: per-run log folders next to console output
//!
//! ## Usage
//!
//! ```rust
//! use uniform_spatial::prelude::*;
//! use uniform_spatial::glam::Vec3;
//!
//! let config = SpatialConfig::default();
//! let mut db = build_database(&config)?;
//!
//! let crowd = (0..100).map(|i| {
//!     let t = i as f32 * 0.1;
//!     SpatialElement::new(Vec3::new(t, 0.5, -t), EntityHandle::new(i, 0), ObjectCategory(0))
//! });
//! let stats = db.rebuild(crowd)?;
//! assert_eq!(stats.stored + stats.overflowed + stats.out_of_bounds, 100);
//!
//! let mut nearby = CollectAll::new(Vec3::ZERO, Vec3::splat(2.0), CategoryFilter::Any);
//! db.query_aabb(Vec3::ZERO, Vec3::splat(2.0), &mut nearby);
//! # Ok::<(), uniform_spatial::spatial::SpatialError>(())
//! ```
//!
//! ## Crates
//!
//! - **uniform-spatial-core**: grid geometry, bucket storage, queries
//! - **uniform-spatial-config**: TOML configuration with env/CLI overrides
//! - **uniform-spatial-observability**: tracing setup with per-crate debug flags
//!
//! ## License
//!
//! Apache-2.0

pub use glam;
pub use uniform_spatial_config as config;
pub use uniform_spatial_core as spatial;
pub use uniform_spatial_observability as observability;

use uniform_spatial_config::{GridConfig, LoggingConfig, SpatialConfig};
use uniform_spatial_core::{SpatialResult, UniformGrid, UniformSpatialDatabase};
use uniform_spatial_observability::{CrateDebugFlags, LoggingGuard, LoggingOptions};

/// Build the grid described by the `[grid]` section
///
/// # Errors
///
/// `SpatialError::InvalidGrid` if the values do not describe a usable grid
pub fn grid_from_config(grid: &GridConfig) -> SpatialResult<UniformGrid> {
    let [x, y, z] = grid.cell_count_per_axis;
    UniformGrid::new(grid.cell_size, glam::IVec3::new(x, y, z), grid.grow_factor)
}

/// Build and initialise a database from configuration
pub fn build_database(config: &SpatialConfig) -> SpatialResult<UniformSpatialDatabase> {
    let grid = grid_from_config(&config.grid)?;
    UniformSpatialDatabase::initialize(grid, config.grid.initial_capacity_per_cell)
}

/// Map the `[logging]` section onto subscriber options
pub fn logging_options(logging: &LoggingConfig) -> LoggingOptions {
    LoggingOptions {
        level: logging.level.clone(),
        file_logging: logging.file_logging,
        log_dir: Some(logging.log_dir.clone()),
        ..LoggingOptions::default()
    }
}

/// Install logging for a process using the `[logging]` section and the given debug flags
pub fn init_logging_from_config(
    config: &SpatialConfig,
    debug_flags: &CrateDebugFlags,
) -> anyhow::Result<LoggingGuard> {
    uniform_spatial_observability::init_logging(debug_flags, &logging_options(&config.logging))
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::spatial::prelude::*;
    pub use crate::spatial::DatabaseStats;

    pub use crate::config::{load_config, validate_config, SpatialConfig};

    pub use crate::{build_database, grid_from_config};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_database_from_default_config() {
        let config = SpatialConfig::default();
        let db = build_database(&config).unwrap();
        let [x, y, z] = config.grid.cell_count_per_axis;
        assert_eq!(db.grid().cell_count(), (x * y * z) as usize);
        assert_eq!(
            db.total_capacity(),
            db.grid().cell_count() * config.grid.initial_capacity_per_cell as usize
        );
    }

    #[test]
    fn test_invalid_grid_config_is_rejected() {
        let mut config = SpatialConfig::default();
        config.grid.cell_count_per_axis = [4, -1, 4];
        assert!(build_database(&config).is_err());
    }

    #[test]
    fn test_logging_options_mapping() {
        let mut logging = LoggingConfig::default();
        logging.level = "debug".to_string();
        logging.file_logging = true;
        logging.log_dir = PathBuf::from("/var/log/spatial");

        let options = logging_options(&logging);
        assert_eq!(options.level, "debug");
        assert!(options.file_logging);
        assert_eq!(options.log_dir, Some(PathBuf::from("/var/log/spatial")));
        assert_eq!(options.retention_runs, LoggingOptions::default().retention_runs);
    }
}
