// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Uniform Spatial Core

Uniform-grid spatial index for large sets of point-like entities that are
re-indexed every tick.

- [`grid`]: grid geometry and coordinate <-> cell index math
- [`database`]: flat per-cell bucket storage and the clear/resize/insert cycle
- [`query`]: plain and proximity-ordered AABB traversals
- [`collectors`]: ready-made query visitors

## Tick Cycle

```rust
use glam::{IVec3, Vec3};
use uniform_spatial_core::prelude::*;

let grid = UniformGrid::new(2.0, IVec3::new(16, 4, 16), 1.5)?;
let mut db = UniformSpatialDatabase::initialize(grid, 8)?;

// Build phase: exclusive access
db.clear_and_resize()?;
db.add(SpatialElement::new(Vec3::new(1.0, 0.0, 1.0), EntityHandle::new(7, 0), ObjectCategory(1)));

// Query phase: shared access
let mut nearest = NearestMatch::new(Vec3::ZERO, CategoryFilter::Any);
db.query_aabb_proximity_order(Vec3::ZERO, Vec3::splat(4.0), &mut nearest);
assert_eq!(nearest.nearest().map(|e| e.entity.index), Some(7));
# Ok::<(), uniform_spatial_core::SpatialError>(())
```

Positions outside the grid are not indexed. Cells that run out of room drop
the element for the current tick and grow on the next rebuild.
*/

pub mod collectors;
pub mod database;
pub mod grid;
pub mod query;
pub mod types;

pub use collectors::{CategoryFilter, CellCounter, CollectAll, FirstMatch, NearestMatch};
pub use database::{DatabaseStats, RebuildStats, UniformSpatialDatabase};
pub use grid::{aabb_intersect_aabb, distance_sq_aabb_to_point, UniformGrid};
pub use query::{
    chebyshev_distance, for_each_cell_in_range, for_each_cell_in_shells, SpatialQueryCollector,
};
pub use types::{
    EntityHandle, InsertOutcome, ObjectCategory, SpatialCell, SpatialElement, SpatialError,
    SpatialResult,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::collectors::{CategoryFilter, CellCounter, CollectAll, FirstMatch, NearestMatch};
    pub use crate::database::{RebuildStats, UniformSpatialDatabase};
    pub use crate::grid::UniformGrid;
    pub use crate::query::SpatialQueryCollector;
    pub use crate::types::{
        EntityHandle, InsertOutcome, ObjectCategory, SpatialCell, SpatialElement, SpatialError,
        SpatialResult,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{IVec3, Vec3};

    #[test]
    fn test_database_is_shareable_between_readers() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UniformSpatialDatabase>();
    }

    #[test]
    fn test_concurrent_queries_on_snapshot() {
        let grid = UniformGrid::new(1.0, IVec3::splat(6), 2.0).unwrap();
        let mut db = UniformSpatialDatabase::initialize(grid, 4).unwrap();
        for i in 0..20 {
            let t = i as f32 * 0.25 - 2.5;
            db.add(SpatialElement::new(
                Vec3::new(t, 0.1, -t),
                EntityHandle::new(i, 0),
                ObjectCategory(0),
            ));
        }

        let totals: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut counter = CellCounter::default();
                        db.query_aabb(Vec3::ZERO, Vec3::splat(10.0), &mut counter);
                        counter.elements
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(totals.iter().all(|&t| t == db.stored_count()));
    }
}
