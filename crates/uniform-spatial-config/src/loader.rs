// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Values are layered in three tiers, later tiers winning:
//! 1. TOML file
//! 2. Environment variables
//! 3. CLI arguments

use crate::{ConfigError, ConfigResult, SpatialConfig, CONFIG_FILE_NAME};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Find the configuration file
///
/// Search order:
/// 1. `USPATIAL_CONFIG_PATH` environment variable
/// 2. Current working directory: `./uniform_spatial.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("USPATIAL_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by USPATIAL_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        search_paths.extend(cwd.ancestors().skip(1).take(5).map(|dir| dir.join(CONFIG_FILE_NAME)));
    }

    if let Some(found) = search_paths.iter().find(|path| path.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet USPATIAL_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is discovered.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the config file is not found or contains invalid TOML.
/// Validation is left to [`validate_config`](crate::validate_config).
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SpatialConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: SpatialConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `USPATIAL_CELL_SIZE` -> `grid.cell_size`
/// - `USPATIAL_CELL_COUNT` -> `grid.cell_count_per_axis` (as `x,y,z`)
/// - `USPATIAL_GROW_FACTOR` -> `grid.grow_factor`
/// - `USPATIAL_INITIAL_CAPACITY` -> `grid.initial_capacity_per_cell`
/// - `USPATIAL_LOG_LEVEL` -> `logging.level`
/// - `USPATIAL_FILE_LOGGING` -> `logging.file_logging`
/// - `USPATIAL_LOG_DIR` -> `logging.log_dir`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut SpatialConfig) {
    let lookup = |key: &str| env::var(key).ok();
    apply_overrides(
        config,
        [
            ("USPATIAL_CELL_SIZE", Field::CellSize),
            ("USPATIAL_CELL_COUNT", Field::CellCount),
            ("USPATIAL_GROW_FACTOR", Field::GrowFactor),
            ("USPATIAL_INITIAL_CAPACITY", Field::InitialCapacity),
            ("USPATIAL_LOG_LEVEL", Field::LogLevel),
            ("USPATIAL_FILE_LOGGING", Field::FileLogging),
            ("USPATIAL_LOG_DIR", Field::LogDir),
        ],
        lookup,
    );
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - CLI arguments, e.g. `{"cell_size": "2.0", "cell_count": "16,4,16"}`
pub fn apply_cli_overrides(config: &mut SpatialConfig, cli_args: &HashMap<String, String>) {
    apply_overrides(
        config,
        [
            ("cell_size", Field::CellSize),
            ("cell_count", Field::CellCount),
            ("grow_factor", Field::GrowFactor),
            ("initial_capacity", Field::InitialCapacity),
            ("log_level", Field::LogLevel),
            ("file_logging", Field::FileLogging),
            ("log_dir", Field::LogDir),
        ],
        |key| cli_args.get(key).cloned(),
    );
}

#[derive(Clone, Copy)]
enum Field {
    CellSize,
    CellCount,
    GrowFactor,
    InitialCapacity,
    LogLevel,
    FileLogging,
    LogDir,
}

fn apply_overrides<const N: usize>(
    config: &mut SpatialConfig,
    keys: [(&str, Field); N],
    lookup: impl Fn(&str) -> Option<String>,
) {
    for (key, field) in keys {
        let Some(value) = lookup(key) else {
            continue;
        };
        let value = value.trim();
        match field {
            Field::CellSize => {
                if let Ok(size) = value.parse::<f32>() {
                    config.grid.cell_size = size;
                }
            }
            Field::CellCount => {
                if let Some(counts) = parse_axis_counts(value) {
                    config.grid.cell_count_per_axis = counts;
                }
            }
            Field::GrowFactor => {
                if let Ok(factor) = value.parse::<f32>() {
                    config.grid.grow_factor = factor;
                }
            }
            Field::InitialCapacity => {
                if let Ok(capacity) = value.parse::<u32>() {
                    config.grid.initial_capacity_per_cell = capacity;
                }
            }
            Field::LogLevel => config.logging.level = value.to_lowercase(),
            Field::FileLogging => config.logging.file_logging = parse_flag(value),
            Field::LogDir => config.logging.log_dir = PathBuf::from(value),
        }
    }
}

/// Parse `x,y,z` into per-axis cell counts
fn parse_axis_counts(value: &str) -> Option<[i32; 3]> {
    let mut parts = value.split(',').map(|part| part.trim().parse::<i32>());
    let counts = [parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?];
    if parts.next().is_some() {
        return None;
    }
    Some(counts)
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}
