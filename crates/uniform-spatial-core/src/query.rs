// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
AABB range queries over a built database.

Two traversals cover the same inclusive cell range:

- [`query_aabb`](UniformSpatialDatabase::query_aabb) sweeps `y`, `z`, `x`
  (x innermost) in cell order.
- [`query_aabb_proximity_order`](UniformSpatialDatabase::query_aabb_proximity_order)
  visits Chebyshev shells around the cell containing the query centre, so
  nearer cells come first and early-exit collectors stop sooner.

Both hand each cell and its occupied element window to a
[`SpatialQueryCollector`] and stop as soon as it asks to.
*/

use glam::{IVec3, Vec3};

use crate::database::UniformSpatialDatabase;
use crate::types::{SpatialCell, SpatialElement};

/// Visitor driven by the AABB queries
pub trait SpatialQueryCollector {
    /// Inspect one cell and the elements stored in it this tick.
    ///
    /// Return `true` to stop the query immediately.
    fn on_visit(&mut self, cell: &SpatialCell, elements: &[SpatialElement]) -> bool;
}

impl<F> SpatialQueryCollector for F
where
    F: FnMut(&SpatialCell, &[SpatialElement]) -> bool,
{
    #[inline]
    fn on_visit(&mut self, cell: &SpatialCell, elements: &[SpatialElement]) -> bool {
        self(cell, elements)
    }
}

/// Visit every coordinate of the inclusive range `[min, max]`, `y` outermost
/// and `x` innermost.
///
/// Returns `true` if `visit` requested an early exit.
#[inline]
pub fn for_each_cell_in_range<F>(min: IVec3, max: IVec3, mut visit: F) -> bool
where
    F: FnMut(IVec3) -> bool,
{
    for y in min.y..=max.y {
        for z in min.z..=max.z {
            for x in min.x..=max.x {
                if visit(IVec3::new(x, y, z)) {
                    return true;
                }
            }
        }
    }
    false
}

/// Chebyshev distance between two cell coordinates
#[inline]
pub fn chebyshev_distance(a: IVec3, b: IVec3) -> i32 {
    (a - b).abs().max_element()
}

/// Visit every coordinate of `[min, max]` in shells of increasing Chebyshev
/// distance from `source`. Within a shell the order is `y`, `z`, `x`.
///
/// Rows that cross the interior of a shell jump straight from the near edge
/// to the far edge, so every coordinate is visited exactly once overall.
///
/// Returns `true` if `visit` requested an early exit.
#[inline]
pub fn for_each_cell_in_shells<F>(source: IVec3, min: IVec3, max: IVec3, mut visit: F) -> bool
where
    F: FnMut(IVec3) -> bool,
{
    let max_layer = (max - source).max(source - min).max_element();

    for layer in 0..=max_layer {
        for y in (source.y - layer)..=(source.y + layer) {
            if y < min.y || y > max.y {
                continue;
            }
            for z in (source.z - layer)..=(source.z + layer) {
                if z < min.z || z > max.z {
                    continue;
                }

                let x_end = source.x + layer;
                let mut x = source.x - layer;
                while x <= x_end {
                    if x < min.x || x > max.x {
                        x += 1;
                        continue;
                    }

                    let coords = IVec3::new(x, y, z);
                    if chebyshev_distance(coords, source) != layer {
                        // Interior of the shell, already covered by an inner layer
                        x = x_end;
                        continue;
                    }

                    if visit(coords) {
                        return true;
                    }
                    x += 1;
                }
            }
        }
    }
    false
}

impl UniformSpatialDatabase {
    /// Visit every cell overlapped by the box `center ± half_extents` in cell order.
    ///
    /// A box that misses the grid visits nothing.
    #[inline]
    pub fn query_aabb<C>(&self, center: Vec3, half_extents: Vec3, collector: &mut C)
    where
        C: SpatialQueryCollector + ?Sized,
    {
        let Some((min, max)) = self
            .grid()
            .aabb_min_max_coords(center - half_extents, center + half_extents)
        else {
            return;
        };

        for_each_cell_in_range(min, max, |coords| self.visit_cell(coords, &mut *collector));
    }

    /// Same cell set as [`query_aabb`](Self::query_aabb), visited nearest
    /// shell first around the cell containing `center`.
    #[inline]
    pub fn query_aabb_proximity_order<C>(&self, center: Vec3, half_extents: Vec3, collector: &mut C)
    where
        C: SpatialQueryCollector + ?Sized,
    {
        let grid = self.grid();
        let Some((min, max)) =
            grid.aabb_min_max_coords(center - half_extents, center + half_extents)
        else {
            return;
        };
        let source = grid.cell_coords_from_position(center);

        for_each_cell_in_shells(source, min, max, |coords| {
            self.visit_cell(coords, &mut *collector)
        });
    }

    #[inline]
    fn visit_cell<C>(&self, coords: IVec3, collector: &mut C) -> bool
    where
        C: SpatialQueryCollector + ?Sized,
    {
        let cell = &self.cells()[self.grid().cell_index_from_coords(coords)];
        collector.on_visit(cell, self.cell_elements(cell))
    }
}
