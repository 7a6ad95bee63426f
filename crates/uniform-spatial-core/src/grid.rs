// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Uniform grid geometry.

The indexed volume is centred on the origin and split into cubic cells.
Cells are numbered X fastest, then Z, then Y:

```text
index = x + z * count_x + y * (count_x * count_z)
```

Every serialized cell buffer depends on this ordering, so it must not change.
*/

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::types::{SpatialError, SpatialResult};

/// Default upper bound for [`UniformGrid::subdivision_level_for_max_cell_size`]
pub const DEFAULT_MAX_SUBDIVISION_LEVEL: u32 = 5;

/// Immutable description of the indexed volume
///
/// Serialized as its three defining parameters. Deserializing goes through
/// [`UniformGrid::new`], so a snapshot cannot describe an invalid grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridRepr", into = "GridRepr")]
pub struct UniformGrid {
    cell_size: f32,
    cell_count_per_axis: IVec3,
    cell_count: usize,
    cell_count_per_xz_layer: usize,
    grow_factor: f32,
    extents: Vec3,
    bounds_min: Vec3,
    bounds_max: Vec3,
}

/// Wire form of [`UniformGrid`]
#[derive(Serialize, Deserialize)]
struct GridRepr {
    cell_size: f32,
    cell_count_per_axis: IVec3,
    grow_factor: f32,
}

impl From<UniformGrid> for GridRepr {
    fn from(grid: UniformGrid) -> Self {
        Self {
            cell_size: grid.cell_size,
            cell_count_per_axis: grid.cell_count_per_axis,
            grow_factor: grid.grow_factor,
        }
    }
}

impl TryFrom<GridRepr> for UniformGrid {
    type Error = SpatialError;

    fn try_from(repr: GridRepr) -> SpatialResult<Self> {
        Self::new(repr.cell_size, repr.cell_count_per_axis, repr.grow_factor)
    }
}

impl UniformGrid {
    /// Build a grid of `cell_count_per_axis` cubic cells of edge `cell_size`.
    ///
    /// # Errors
    ///
    /// Returns `SpatialError::InvalidGrid` if the cell size is not a positive
    /// finite number, an axis has no cells, the grow factor is below 1 or not
    /// finite, or the total cell count does not fit a `u32` cell offset.
    pub fn new(cell_size: f32, cell_count_per_axis: IVec3, grow_factor: f32) -> SpatialResult<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(SpatialError::InvalidGrid(format!(
                "cell size must be positive and finite, got {}",
                cell_size
            )));
        }
        if cell_count_per_axis.cmplt(IVec3::ONE).any() {
            return Err(SpatialError::InvalidGrid(format!(
                "every axis needs at least one cell, got {}",
                cell_count_per_axis
            )));
        }
        if !grow_factor.is_finite() || grow_factor < 1.0 {
            return Err(SpatialError::InvalidGrid(format!(
                "grow factor must be finite and >= 1.0, got {}",
                grow_factor
            )));
        }

        let cell_count = (cell_count_per_axis.x as u64)
            * (cell_count_per_axis.y as u64)
            * (cell_count_per_axis.z as u64);
        if cell_count > u32::MAX as u64 {
            return Err(SpatialError::InvalidGrid(format!(
                "{} cells exceed the addressable cell range",
                cell_count
            )));
        }

        let extents = cell_count_per_axis.as_vec3() * cell_size / 2.0;

        Ok(Self {
            cell_size,
            cell_count_per_axis,
            cell_count: cell_count as usize,
            cell_count_per_xz_layer: cell_count_per_axis.x as usize * cell_count_per_axis.z as usize,
            grow_factor,
            extents,
            bounds_min: -extents,
            bounds_max: extents,
        })
    }

    /// Cubic grid with `2^subdivisions` cells per axis covering `[-half_extents, half_extents]`.
    pub fn from_subdivisions(
        half_extents: f32,
        subdivisions: u32,
        grow_factor: f32,
    ) -> SpatialResult<Self> {
        if subdivisions > 10 {
            return Err(SpatialError::InvalidGrid(format!(
                "{} subdivisions exceed the supported maximum of 10",
                subdivisions
            )));
        }
        let per_axis = 1i32 << subdivisions;
        let cell_size = (half_extents * 2.0) / per_axis as f32;
        Self::new(cell_size, IVec3::splat(per_axis), grow_factor)
    }

    /// Smallest subdivision level whose cells are smaller than `max_cell_size`.
    ///
    /// Levels are tried from 1 up to `max_subdivision_level`; if none is fine
    /// enough the maximum level is returned.
    pub fn subdivision_level_for_max_cell_size(
        half_extents: f32,
        max_cell_size: f32,
        max_subdivision_level: u32,
    ) -> u32 {
        for level in 1..=max_subdivision_level {
            let cells_per_axis = 2f32.powi(level as i32);
            let cell_size = (half_extents * 2.0) / cells_per_axis;
            if cell_size < max_cell_size {
                return level;
            }
        }
        max_subdivision_level
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cell_count_per_axis(&self) -> IVec3 {
        self.cell_count_per_axis
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    #[inline]
    pub fn cell_count_per_xz_layer(&self) -> usize {
        self.cell_count_per_xz_layer
    }

    #[inline]
    pub fn grow_factor(&self) -> f32 {
        self.grow_factor
    }

    /// Half size of the indexed volume
    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.extents
    }

    #[inline]
    pub fn bounds_min(&self) -> Vec3 {
        self.bounds_min
    }

    #[inline]
    pub fn bounds_max(&self) -> Vec3 {
        self.bounds_max
    }

    /// Strict containment test. Points lying on a boundary plane are outside.
    #[inline]
    pub fn is_in_bounds(&self, position: Vec3) -> bool {
        position.cmpgt(self.bounds_min).all() && position.cmplt(self.bounds_max).all()
    }

    /// Cell coordinates containing `position`, clamped into the grid.
    ///
    /// Clamping means boundary and outside positions still resolve to an edge
    /// cell; check [`is_in_bounds`](Self::is_in_bounds) first when that matters.
    #[inline]
    pub fn cell_coords_from_position(&self, position: Vec3) -> IVec3 {
        let local = position - self.bounds_min;
        let coords = (local / self.cell_size).floor().as_ivec3();
        coords.clamp(IVec3::ZERO, self.cell_count_per_axis - IVec3::ONE)
    }

    /// Index of the cell containing `position`, or `None` when out of bounds
    #[inline]
    pub fn cell_index(&self, position: Vec3) -> Option<usize> {
        if self.is_in_bounds(position) {
            Some(self.cell_index_from_coords(self.cell_coords_from_position(position)))
        } else {
            None
        }
    }

    /// Flat index of in-grid coordinates
    #[inline]
    pub fn cell_index_from_coords(&self, coords: IVec3) -> usize {
        debug_assert!(
            self.contains_coords(coords),
            "cell coordinates {} outside grid {}",
            coords,
            self.cell_count_per_axis
        );
        coords.x as usize
            + coords.z as usize * self.cell_count_per_axis.x as usize
            + coords.y as usize * self.cell_count_per_xz_layer
    }

    /// Inverse of [`cell_index_from_coords`](Self::cell_index_from_coords)
    #[inline]
    pub fn cell_coords_from_index(&self, index: usize) -> IVec3 {
        let count_x = self.cell_count_per_axis.x as usize;
        let y = index / self.cell_count_per_xz_layer;
        let rem = index % self.cell_count_per_xz_layer;
        IVec3::new((rem % count_x) as i32, y as i32, (rem / count_x) as i32)
    }

    #[inline]
    pub fn contains_coords(&self, coords: IVec3) -> bool {
        coords.cmpge(IVec3::ZERO).all() && coords.cmplt(self.cell_count_per_axis).all()
    }

    /// World-space centre of a cell
    #[inline]
    pub fn cell_center(&self, coords: IVec3) -> Vec3 {
        let min_center = self.bounds_min + Vec3::splat(self.cell_size * 0.5);
        min_center + coords.as_vec3() * self.cell_size
    }

    /// World-space `(min, max)` corners of a cell
    #[inline]
    pub fn cell_bounds(&self, coords: IVec3) -> (Vec3, Vec3) {
        let min = self.bounds_min + coords.as_vec3() * self.cell_size;
        (min, min + Vec3::splat(self.cell_size))
    }

    /// Clamp a query box to the grid and return the inclusive cell range it
    /// covers, or `None` when the box misses the grid entirely.
    #[inline]
    pub fn aabb_min_max_coords(&self, aabb_min: Vec3, aabb_max: Vec3) -> Option<(IVec3, IVec3)> {
        if !aabb_intersect_aabb(aabb_min, aabb_max, self.bounds_min, self.bounds_max) {
            return None;
        }

        let clamped_min = aabb_min.max(self.bounds_min).min(self.bounds_max);
        let clamped_max = aabb_max.max(self.bounds_min).min(self.bounds_max);

        Some((
            self.cell_coords_from_position(clamped_min),
            self.cell_coords_from_position(clamped_max),
        ))
    }
}

/// Inclusive overlap test between two axis-aligned boxes
#[inline]
pub fn aabb_intersect_aabb(a_min: Vec3, a_max: Vec3, b_min: Vec3, b_max: Vec3) -> bool {
    a_min.cmple(b_max).all() && a_max.cmpge(b_min).all()
}

/// Squared distance from `point` to the closest point of the box (0 inside)
#[inline]
pub fn distance_sq_aabb_to_point(point: Vec3, aabb_min: Vec3, aabb_max: Vec3) -> f32 {
    let on_bounds = point.max(aabb_min).min(aabb_max);
    (on_bounds - point).length_squared()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x1x2() -> UniformGrid {
        UniformGrid::new(2.0, IVec3::new(2, 1, 2), 1.5).unwrap()
    }

    #[test]
    fn test_bounds_are_symmetric() {
        let grid = grid_2x1x2();
        assert_eq!(grid.bounds_min(), Vec3::new(-2.0, -1.0, -2.0));
        assert_eq!(grid.bounds_max(), Vec3::new(2.0, 1.0, 2.0));
        assert_eq!(
            grid.bounds_max() - grid.bounds_min(),
            grid.cell_count_per_axis().as_vec3() * grid.cell_size()
        );
        assert_eq!(grid.cell_count(), 4);
        assert_eq!(grid.cell_count_per_xz_layer(), 4);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(UniformGrid::new(0.0, IVec3::ONE, 1.0).is_err());
        assert!(UniformGrid::new(f32::NAN, IVec3::ONE, 1.0).is_err());
        assert!(UniformGrid::new(1.0, IVec3::new(1, 0, 1), 1.0).is_err());
        assert!(UniformGrid::new(1.0, IVec3::ONE, 0.5).is_err());
        assert!(UniformGrid::new(1.0, IVec3::ONE, f32::INFINITY).is_err());
        assert!(UniformGrid::new(1.0, IVec3::splat(4096), 1.0).is_err());
    }

    #[test]
    fn test_boundary_points_are_out_of_bounds() {
        let grid = grid_2x1x2();
        assert!(grid.is_in_bounds(Vec3::ZERO));
        assert!(!grid.is_in_bounds(Vec3::new(2.0, 0.0, 0.0)));
        assert!(!grid.is_in_bounds(Vec3::new(0.0, -1.0, 0.0)));
        assert!(!grid.is_in_bounds(Vec3::new(0.0, 0.0, -2.0)));
        assert_eq!(grid.cell_index(Vec3::new(2.0, 0.0, 0.0)), None);
        assert_eq!(grid.cell_index(Vec3::new(5.0, 0.0, 5.0)), None);
    }

    #[test]
    fn test_coords_are_clamped() {
        let grid = grid_2x1x2();
        assert_eq!(
            grid.cell_coords_from_position(Vec3::new(100.0, 100.0, 100.0)),
            IVec3::new(1, 0, 1)
        );
        assert_eq!(
            grid.cell_coords_from_position(Vec3::new(-100.0, -100.0, -100.0)),
            IVec3::ZERO
        );
        // Exactly on the max plane floors to `count`, clamp pulls it back in
        assert_eq!(
            grid.cell_coords_from_position(Vec3::new(2.0, 1.0, 2.0)),
            IVec3::new(1, 0, 1)
        );
    }

    #[test]
    fn test_index_ordering_is_x_then_z_then_y() {
        let grid = UniformGrid::new(1.0, IVec3::new(3, 4, 5), 1.0).unwrap();
        assert_eq!(grid.cell_index_from_coords(IVec3::new(0, 0, 0)), 0);
        assert_eq!(grid.cell_index_from_coords(IVec3::new(1, 0, 0)), 1);
        assert_eq!(grid.cell_index_from_coords(IVec3::new(0, 0, 1)), 3);
        assert_eq!(grid.cell_index_from_coords(IVec3::new(0, 1, 0)), 15);
        assert_eq!(grid.cell_index_from_coords(IVec3::new(2, 3, 4)), 2 + 4 * 3 + 3 * 15);

        for index in 0..grid.cell_count() {
            let coords = grid.cell_coords_from_index(index);
            assert_eq!(grid.cell_index_from_coords(coords), index);
        }
    }

    #[test]
    fn test_cell_center_maps_back_to_same_cell() {
        let grid = grid_2x1x2();
        let p = Vec3::new(-1.3, 0.2, 0.7);
        let coords = grid.cell_coords_from_position(p);
        let center = grid.cell_center(coords);
        assert_eq!(center, Vec3::new(-1.0, 0.0, 1.0));
        assert_eq!(grid.cell_index(center), grid.cell_index(p));

        let (min, max) = grid.cell_bounds(coords);
        assert_eq!(min, Vec3::new(-2.0, -1.0, 0.0));
        assert_eq!(max, Vec3::new(0.0, 1.0, 2.0));
    }

    #[test]
    fn test_aabb_helpers() {
        let a_min = Vec3::ZERO;
        let a_max = Vec3::ONE;
        assert!(aabb_intersect_aabb(a_min, a_max, Vec3::splat(0.5), Vec3::splat(2.0)));
        // Touching faces count as intersecting
        assert!(aabb_intersect_aabb(a_min, a_max, Vec3::new(1.0, 0.0, 0.0), Vec3::splat(2.0)));
        assert!(!aabb_intersect_aabb(a_min, a_max, Vec3::new(1.1, 0.0, 0.0), Vec3::splat(2.0)));

        assert_eq!(distance_sq_aabb_to_point(Vec3::splat(0.5), a_min, a_max), 0.0);
        assert_eq!(distance_sq_aabb_to_point(Vec3::new(3.0, 0.5, 0.5), a_min, a_max), 4.0);
        assert_eq!(distance_sq_aabb_to_point(Vec3::new(2.0, 2.0, 0.5), a_min, a_max), 2.0);
    }

    #[test]
    fn test_aabb_min_max_coords() {
        let grid = UniformGrid::new(1.0, IVec3::splat(4), 1.0).unwrap();

        let miss = grid.aabb_min_max_coords(Vec3::splat(10.0), Vec3::splat(11.0));
        assert!(miss.is_none());

        let (min, max) = grid
            .aabb_min_max_coords(Vec3::splat(-0.5), Vec3::splat(0.5))
            .unwrap();
        assert_eq!(min, IVec3::splat(1));
        assert_eq!(max, IVec3::splat(2));

        // Box larger than the grid gets clamped to the full range
        let (min, max) = grid
            .aabb_min_max_coords(Vec3::splat(-100.0), Vec3::splat(100.0))
            .unwrap();
        assert_eq!(min, IVec3::ZERO);
        assert_eq!(max, IVec3::splat(3));
    }

    #[test]
    fn test_subdivision_helpers() {
        // 2*8 / 2^s < 3 first holds at s = 3 (cell size 2)
        assert_eq!(UniformGrid::subdivision_level_for_max_cell_size(8.0, 3.0, 5), 3);
        assert_eq!(
            UniformGrid::subdivision_level_for_max_cell_size(1000.0, 0.1, DEFAULT_MAX_SUBDIVISION_LEVEL),
            DEFAULT_MAX_SUBDIVISION_LEVEL
        );

        let grid = UniformGrid::from_subdivisions(8.0, 3, 1.0).unwrap();
        assert_eq!(grid.cell_count_per_axis(), IVec3::splat(8));
        assert_eq!(grid.cell_size(), 2.0);
        assert_eq!(grid.bounds_max(), Vec3::splat(8.0));
        assert!(UniformGrid::from_subdivisions(8.0, 11, 1.0).is_err());
    }

    #[test]
    fn test_grid_snapshot_round_trip() {
        let grid = UniformGrid::new(0.5, IVec3::new(4, 2, 6), 1.25).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        let restored: UniformGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, grid);
        assert_eq!(restored.cell_count(), 48);
    }

    #[test]
    fn test_grid_snapshot_only_stores_parameters() {
        let grid = UniformGrid::new(0.5, IVec3::new(4, 2, 6), 1.25).unwrap();
        let value = serde_json::to_value(grid).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["cell_count_per_axis", "cell_size", "grow_factor"]);
    }

    #[test]
    fn test_invalid_grid_snapshot_is_rejected() {
        let zero_size = r#"{"cell_size":0.0,"cell_count_per_axis":[2,2,2],"grow_factor":2.0}"#;
        let shrinking = r#"{"cell_size":1.0,"cell_count_per_axis":[2,2,2],"grow_factor":0.1}"#;
        let empty_axis = r#"{"cell_size":1.0,"cell_count_per_axis":[2,0,2],"grow_factor":2.0}"#;

        for json in [zero_size, shrinking, empty_axis] {
            let err = serde_json::from_str::<UniformGrid>(json).unwrap_err();
            assert!(err.to_string().contains("Invalid grid"), "{err}");
        }
    }

    #[test]
    fn test_grid_snapshot_recomputes_derived_fields() {
        // Derived fields in the payload are ignored and rebuilt from the parameters
        let json = r#"{"cell_size":2.0,"cell_count_per_axis":[2,1,2],"grow_factor":1.5,
                       "cell_count":999,"bounds_min":[0.0,0.0,0.0]}"#;
        let grid: UniformGrid = serde_json::from_str(json).unwrap();
        assert_eq!(grid.cell_count(), 4);
        assert_eq!(grid.bounds_min(), Vec3::new(-2.0, -1.0, -2.0));
    }
}
