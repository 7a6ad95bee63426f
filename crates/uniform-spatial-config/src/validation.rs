// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks that grid values describe a grid the core crate can build and that
//! logging values are recognised.

use crate::{ConfigError, ConfigResult, SpatialConfig};

/// Largest total cell count; cell windows are addressed with `u32` offsets
pub const MAX_TOTAL_CELLS: u64 = u32::MAX as u64;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &SpatialConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_grid(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_grid(config: &SpatialConfig, errors: &mut Vec<ConfigValidationError>) {
    let grid = &config.grid;

    if !(grid.cell_size.is_finite() && grid.cell_size > 0.0) {
        errors.push(invalid("grid.cell_size", "must be a positive finite number"));
    }

    if grid.cell_count_per_axis.iter().any(|&n| n < 1) {
        errors.push(invalid("grid.cell_count_per_axis", "every axis needs at least 1 cell"));
    } else if grid.total_cells().map_or(true, |total| total > MAX_TOTAL_CELLS) {
        errors.push(invalid(
            "grid.cell_count_per_axis",
            "total cell count must not exceed 4294967295",
        ));
    }

    if !(grid.grow_factor.is_finite() && grid.grow_factor >= 1.0) {
        errors.push(invalid("grid.grow_factor", "must be a finite number >= 1.0"));
    }
}

fn validate_logging(config: &SpatialConfig, errors: &mut Vec<ConfigValidationError>) {
    let logging = &config.logging;

    if !LOG_LEVELS.contains(&logging.level.as_str()) {
        errors.push(invalid(
            "logging.level",
            "must be one of trace, debug, info, warn, error",
        ));
    }

    if logging.file_logging && logging.log_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "logging.log_dir".to_string(),
        });
    }
}
