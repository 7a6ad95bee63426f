// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synthetic tick profiler.
//!
//! Moves a clustered crowd around for a number of ticks, rebuilding the grid
//! each tick and running a batch of queries against it. Rebuild stats and
//! timings are reported through tracing.
//!
//! ```text
//! tick_profile [--config <path>] [--ticks N] [--entities N] [--queries N]
//!              [--seed N] [--set key=value]... [--debug-<crate>|--debug-all]
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use uniform_spatial::config::{
    apply_cli_overrides, apply_environment_overrides, load_config, validate_config, ConfigError,
};
use uniform_spatial::glam::Vec3;
use uniform_spatial::observability::{debug_flags_help, parse_debug_flags};
use uniform_spatial::prelude::*;

struct Args {
    config: Option<PathBuf>,
    ticks: usize,
    entities: usize,
    queries: usize,
    seed: u64,
    overrides: HashMap<String, String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: tick_profile [--config <path>] [--ticks N] [--entities N] [--queries N] [--seed N] [--set key=value]...\n\n\
         Defaults:\n\
         - ticks: 100\n\
         - entities: 50000\n\
         - queries: 1000 per tick\n\
         - seed: 42\n\n\
         Override keys: cell_size, cell_count (x,y,z), grow_factor, initial_capacity, log_level\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> T {
    let value = value.unwrap_or_else(|| usage_and_exit());
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid value for {flag}: {value}");
        usage_and_exit()
    })
}

fn parse_args() -> Args {
    let mut parsed = Args {
        config: None,
        ticks: 100,
        entities: 50_000,
        queries: 1_000,
        seed: 42,
        overrides: HashMap::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--ticks" => parsed.ticks = parse_number(&arg, args.next()),
            "--entities" => parsed.entities = parse_number(&arg, args.next()),
            "--queries" => parsed.queries = parse_number(&arg, args.next()),
            "--seed" => parsed.seed = parse_number(&arg, args.next()),
            "--set" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                let Some((key, value)) = v.split_once('=') else {
                    eprintln!("Expected key=value after --set, got: {v}");
                    usage_and_exit();
                };
                parsed.overrides.insert(key.trim().to_string(), value.trim().to_string());
            }
            "-h" | "--help" => usage_and_exit(),
            // Consumed by parse_debug_flags
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }

    parsed
}

/// Load the config file, falling back to defaults when none is found
fn resolve_config(args: &Args) -> Result<(SpatialConfig, Option<String>)> {
    let (config, note) = match load_config(args.config.as_deref(), Some(&args.overrides)) {
        Ok(config) => (config, None),
        Err(ConfigError::FileNotFound(searched)) if args.config.is_none() => {
            let mut config = SpatialConfig::default();
            apply_environment_overrides(&mut config);
            apply_cli_overrides(&mut config, &args.overrides);
            (config, Some(searched))
        }
        Err(e) => return Err(e).context("Failed to load configuration"),
    };
    validate_config(&config).context("Invalid configuration")?;
    Ok((config, note))
}

/// Wandering crowd gathered around a few hotspots
struct Crowd {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    categories: Vec<ObjectCategory>,
    half_extents: Vec3,
}

impl Crowd {
    fn new(count: usize, half_extents: Vec3, rng: &mut StdRng) -> Self {
        let hotspots: Vec<Vec3> = (0..4)
            .map(|_| random_point(rng, half_extents * 0.6))
            .collect();

        let mut positions = Vec::with_capacity(count);
        let mut velocities = Vec::with_capacity(count);
        let mut categories = Vec::with_capacity(count);
        for i in 0..count {
            let spread = half_extents * 0.15;
            positions.push(hotspots[i % hotspots.len()] + random_point(rng, spread));
            velocities.push(random_point(rng, Vec3::splat(0.5)));
            categories.push(ObjectCategory((i % 3) as u8));
        }

        Self {
            positions,
            velocities,
            categories,
            half_extents,
        }
    }

    fn step(&mut self, dt: f32) {
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            *position += *velocity * dt;
            // Bounce slightly outside the grid so some entities go out of bounds
            let limit = self.half_extents * 1.05;
            for axis in 0..3 {
                if position[axis].abs() > limit[axis] {
                    velocity[axis] = -velocity[axis];
                }
            }
        }
    }

    fn elements(&self) -> impl Iterator<Item = SpatialElement> + '_ {
        self.positions
            .iter()
            .zip(self.categories.iter())
            .enumerate()
            .map(|(i, (&position, &category))| {
                SpatialElement::new(position, EntityHandle::new(i as u32, 0), category)
            })
    }
}

fn random_point(rng: &mut StdRng, half_extents: Vec3) -> Vec3 {
    Vec3::new(
        rng.gen_range(-half_extents.x..=half_extents.x),
        rng.gen_range(-half_extents.y..=half_extents.y),
        rng.gen_range(-half_extents.z..=half_extents.z),
    )
}

#[derive(Default)]
struct Timings {
    rebuild: Duration,
    plain_queries: Duration,
    proximity_queries: Duration,
    plain_hits: usize,
    proximity_hits: usize,
}

/// Average duration per item; counts past `u32::MAX` do not wrap
fn per_item(total: Duration, count: usize) -> Duration {
    total.div_f64(count.max(1) as f64)
}

fn main() -> Result<()> {
    let args = parse_args();
    let (config, missing_config) = resolve_config(&args)?;

    let debug_flags = parse_debug_flags();
    let _logging = uniform_spatial::init_logging_from_config(&config, &debug_flags)?;

    if let Some(searched) = missing_config {
        warn!("No configuration file found, using defaults");
        debug!("{}", searched);
    }

    let mut db = build_database(&config).context("Failed to build spatial database")?;
    let half_extents = db.grid().extents();
    info!(
        cells = db.grid().cell_count(),
        cell_size = db.grid().cell_size(),
        entities = args.entities,
        ticks = args.ticks,
        "Starting tick profile"
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut crowd = Crowd::new(args.entities, half_extents, &mut rng);
    let query_half_extents = Vec3::splat(db.grid().cell_size() * 2.0);
    let mut timings = Timings::default();

    for tick in 0..args.ticks {
        crowd.step(1.0);

        let started = Instant::now();
        let stats = db.rebuild(crowd.elements())?;
        timings.rebuild += started.elapsed();
        debug!(
            tick,
            stored = stats.stored,
            overflowed = stats.overflowed,
            out_of_bounds = stats.out_of_bounds,
            total_capacity = stats.total_capacity,
            "Rebuilt grid"
        );

        let centers: Vec<Vec3> = (0..args.queries)
            .map(|_| random_point(&mut rng, half_extents))
            .collect();
        let mut collector = CollectAll::new(Vec3::ZERO, query_half_extents, CategoryFilter::Any);

        let started = Instant::now();
        for &center in &centers {
            collector.reset(center, query_half_extents);
            db.query_aabb(center, query_half_extents, &mut collector);
            timings.plain_hits += collector.results.len();
        }
        timings.plain_queries += started.elapsed();

        let started = Instant::now();
        for &center in &centers {
            let mut first = FirstMatch::new(
                center,
                query_half_extents,
                CategoryFilter::Only(ObjectCategory(1)),
            );
            db.query_aabb_proximity_order(center, query_half_extents, &mut first);
            timings.proximity_hits += usize::from(first.found.is_some());
        }
        timings.proximity_queries += started.elapsed();
    }

    let queries = args.ticks.saturating_mul(args.queries);
    let stats = db.stats();
    info!(
        total_capacity = stats.total_capacity,
        stored = stats.stored_elements,
        excess = stats.excess_elements,
        occupied_cells = stats.occupied_cells,
        max_cell_length = stats.max_cell_length,
        "Final grid state"
    );
    info!(
        rebuild_per_tick = ?per_item(timings.rebuild, args.ticks),
        plain_query = ?per_item(timings.plain_queries, queries),
        proximity_query = ?per_item(timings.proximity_queries, queries),
        plain_hits = timings.plain_hits,
        proximity_hits = timings.proximity_hits,
        "Timings"
    );

    Ok(())
}
