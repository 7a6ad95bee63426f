// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Flat bucket storage and the per-tick rebuild cycle.

The database owns two buffers: one `SpatialCell` per grid cell and a single
element buffer that the cells slice into contiguous windows. Each tick the
host calls [`clear_and_resize`](UniformSpatialDatabase::clear_and_resize)
and then [`add`](UniformSpatialDatabase::add) once per element. Cells that
overflowed during the previous tick get a larger window on the next rebuild.

Building takes `&mut self` and querying takes `&self`, so the borrow checker
enforces one writer during the build phase and shared readers afterwards.
*/

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::grid::UniformGrid;
use crate::types::{InsertOutcome, SpatialCell, SpatialElement, SpatialError, SpatialResult};

/// Grid plus its cell and element buffers
///
/// Deserialized snapshots are checked against the window layout invariants
/// before any query can index into them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DatabaseRepr")]
pub struct UniformSpatialDatabase {
    grid: UniformGrid,
    cells: Vec<SpatialCell>,
    elements: Vec<SpatialElement>,
}

#[derive(Deserialize)]
struct DatabaseRepr {
    grid: UniformGrid,
    cells: Vec<SpatialCell>,
    elements: Vec<SpatialElement>,
}

impl TryFrom<DatabaseRepr> for UniformSpatialDatabase {
    type Error = SpatialError;

    fn try_from(repr: DatabaseRepr) -> SpatialResult<Self> {
        let DatabaseRepr {
            grid,
            cells,
            elements,
        } = repr;
        validate_layout(&grid, &cells, elements.len())?;
        Ok(Self {
            grid,
            cells,
            elements,
        })
    }
}

/// Outcome counts of a [`rebuild`](UniformSpatialDatabase::rebuild)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub stored: usize,
    pub out_of_bounds: usize,
    pub overflowed: usize,
    /// Element slots available this tick
    pub total_capacity: usize,
}

/// Snapshot statistics about the database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub cell_count: usize,
    pub total_capacity: usize,
    pub stored_elements: usize,
    pub excess_elements: usize,
    pub occupied_cells: usize,
    pub max_cell_length: usize,
}

impl UniformSpatialDatabase {
    /// Allocate both buffers with `initial_capacity_per_cell` slots per cell.
    ///
    /// # Errors
    ///
    /// `SpatialError::CapacityOverflow` if the element buffer would exceed the
    /// `u32` offset range, `SpatialError::Allocation` if memory cannot be
    /// reserved.
    pub fn initialize(grid: UniformGrid, initial_capacity_per_cell: u32) -> SpatialResult<Self> {
        let cell_count = grid.cell_count();
        let total = cell_count as u64 * initial_capacity_per_cell as u64;
        if total > u32::MAX as u64 {
            return Err(SpatialError::CapacityOverflow(format!(
                "{} cells x {} slots exceed the element offset range",
                cell_count, initial_capacity_per_cell
            )));
        }

        let mut cells: Vec<SpatialCell> = allocate_filled(cell_count, "cell")?;
        let elements: Vec<SpatialElement> = allocate_filled(total as usize, "element")?;

        for (i, cell) in cells.iter_mut().enumerate() {
            cell.start = i as u32 * initial_capacity_per_cell;
            cell.capacity = initial_capacity_per_cell;
        }

        info!(
            cells = cell_count,
            capacity_per_cell = initial_capacity_per_cell,
            cell_size = grid.cell_size(),
            "Initialized uniform spatial database"
        );

        Ok(Self {
            grid,
            cells,
            elements,
        })
    }

    /// Discard last tick's elements and repack the cell windows.
    ///
    /// Cells with `excess > 0` grow to `ceil((capacity + excess) * grow_factor)`,
    /// every other cell keeps its capacity. Windows are laid out contiguously in
    /// cell index order and the element buffer is resized and default-filled to
    /// the new total, so nothing from the previous tick survives.
    ///
    /// # Errors
    ///
    /// On `CapacityOverflow` or `Allocation` the database is left untouched.
    pub fn clear_and_resize(&mut self) -> SpatialResult<()> {
        let grow_factor = self.grid.grow_factor();

        let total = self
            .cells
            .iter()
            .fold(0u64, |total, cell| {
                total.saturating_add(grown_capacity(cell, grow_factor))
            });
        if total > u32::MAX as u64 {
            return Err(SpatialError::CapacityOverflow(format!(
                "rebuild requested {} element slots",
                total
            )));
        }
        let total = total as usize;

        let additional = total.saturating_sub(self.elements.len());
        if self.elements.try_reserve_exact(additional).is_err() {
            warn!(requested = total, "Element buffer allocation failed during rebuild");
            return Err(SpatialError::Allocation {
                buffer: "element",
                requested: total,
            });
        }

        let mut start = 0u32;
        let mut grown_cells = 0usize;
        for (index, cell) in self.cells.iter_mut().enumerate() {
            // Fits: the sum of all grown capacities was checked above
            let capacity = grown_capacity(cell, grow_factor) as u32;
            if capacity != cell.capacity {
                trace!(
                    cell = index,
                    old_capacity = cell.capacity,
                    excess = cell.excess,
                    new_capacity = capacity,
                    "Growing cell window"
                );
                grown_cells += 1;
            }
            *cell = SpatialCell {
                start,
                capacity,
                length: 0,
                excess: 0,
            };
            start += capacity;
        }

        self.elements.clear();
        self.elements.resize(total, SpatialElement::default());

        debug!(
            total_capacity = total,
            grown_cells, "Cleared and resized spatial database"
        );
        Ok(())
    }

    /// Reset every cell's length without touching capacities, excess counters
    /// or the element buffer.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.length = 0;
        }
    }

    /// Insert one element into the cell containing its position.
    ///
    /// Out-of-bounds elements are ignored. When the cell window is full the
    /// element is dropped and the cell's `excess` counter is incremented,
    /// which the next [`clear_and_resize`](Self::clear_and_resize) consumes.
    #[inline]
    pub fn add(&mut self, element: SpatialElement) -> InsertOutcome {
        let Some(cell_index) = self.grid.cell_index(element.position) else {
            return InsertOutcome::OutOfBounds;
        };

        let cell = &mut self.cells[cell_index];
        if cell.is_full() {
            cell.excess = cell.excess.saturating_add(1);
            InsertOutcome::Overflow { cell_index }
        } else {
            self.elements[(cell.start + cell.length) as usize] = element;
            cell.length += 1;
            InsertOutcome::Stored { cell_index }
        }
    }

    /// One full tick: `clear_and_resize` followed by `add` for every element.
    pub fn rebuild<I>(&mut self, elements: I) -> SpatialResult<RebuildStats>
    where
        I: IntoIterator<Item = SpatialElement>,
    {
        self.clear_and_resize()?;

        let mut stats = RebuildStats {
            total_capacity: self.elements.len(),
            ..RebuildStats::default()
        };
        for element in elements {
            match self.add(element) {
                InsertOutcome::Stored { .. } => stats.stored += 1,
                InsertOutcome::OutOfBounds => stats.out_of_bounds += 1,
                InsertOutcome::Overflow { .. } => stats.overflowed += 1,
            }
        }

        if stats.overflowed > 0 {
            debug!(
                overflowed = stats.overflowed,
                "Cells overflowed, windows grow on next rebuild"
            );
        }
        Ok(stats)
    }

    #[inline]
    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    #[inline]
    pub fn cells(&self) -> &[SpatialCell] {
        &self.cells
    }

    /// The whole element buffer, including unused slots
    #[inline]
    pub fn elements(&self) -> &[SpatialElement] {
        &self.elements
    }

    #[inline]
    pub fn cell(&self, index: usize) -> Option<&SpatialCell> {
        self.cells.get(index)
    }

    /// Elements stored in `cell` this tick
    #[inline]
    pub fn cell_elements(&self, cell: &SpatialCell) -> &[SpatialElement] {
        &self.elements[cell.occupied_range()]
    }

    /// Elements stored in the cell at `index`, empty for an invalid index
    pub fn elements_in_cell(&self, index: usize) -> &[SpatialElement] {
        self.cells
            .get(index)
            .map(|cell| self.cell_elements(cell))
            .unwrap_or(&[])
    }

    #[inline]
    pub fn total_capacity(&self) -> usize {
        self.elements.len()
    }

    pub fn stored_count(&self) -> usize {
        self.cells.iter().map(|cell| cell.length as usize).sum()
    }

    pub fn stats(&self) -> DatabaseStats {
        let mut stats = DatabaseStats {
            cell_count: self.cells.len(),
            total_capacity: self.elements.len(),
            ..DatabaseStats::default()
        };
        for cell in &self.cells {
            let length = cell.length as usize;
            stats.stored_elements += length;
            stats.excess_elements += cell.excess as usize;
            if length > 0 {
                stats.occupied_cells += 1;
            }
            stats.max_cell_length = stats.max_cell_length.max(length);
        }
        stats
    }
}

/// Window size a cell gets at the next rebuild.
///
/// Not clamped to `u32`; callers reject totals past the offset range.
#[inline]
fn grown_capacity(cell: &SpatialCell, grow_factor: f32) -> u64 {
    if cell.excess == 0 {
        return cell.capacity as u64;
    }
    let wanted = cell.capacity as u64 + cell.excess as u64;
    // f32 to u64 casts saturate
    (wanted as f32 * grow_factor).ceil() as u64
}

fn allocate_filled<T: Clone + Default>(len: usize, buffer: &'static str) -> SpatialResult<Vec<T>> {
    let mut values = Vec::new();
    if values.try_reserve_exact(len).is_err() {
        warn!(buffer, requested = len, "Spatial buffer allocation failed");
        return Err(SpatialError::Allocation {
            buffer,
            requested: len,
        });
    }
    values.resize(len, T::default());
    Ok(values)
}

/// Windows must cover the element buffer contiguously in cell order
fn validate_layout(
    grid: &UniformGrid,
    cells: &[SpatialCell],
    element_count: usize,
) -> SpatialResult<()> {
    if cells.len() != grid.cell_count() {
        return Err(SpatialError::InvalidLayout(format!(
            "{} cells for a grid of {}",
            cells.len(),
            grid.cell_count()
        )));
    }

    let mut expected_start = 0u64;
    for (index, cell) in cells.iter().enumerate() {
        if cell.start as u64 != expected_start {
            return Err(SpatialError::InvalidLayout(format!(
                "cell {} starts at {}, expected {}",
                index, cell.start, expected_start
            )));
        }
        if cell.length > cell.capacity {
            return Err(SpatialError::InvalidLayout(format!(
                "cell {} holds {} elements in a window of {}",
                index, cell.length, cell.capacity
            )));
        }
        expected_start += cell.capacity as u64;
    }

    if expected_start != element_count as u64 || expected_start > u32::MAX as u64 {
        return Err(SpatialError::InvalidLayout(format!(
            "windows cover {} slots but the element buffer has {}",
            expected_start, element_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityHandle, ObjectCategory};
    use glam::{IVec3, Vec3};

    fn element(x: f32, y: f32, z: f32, id: u32) -> SpatialElement {
        SpatialElement::new(Vec3::new(x, y, z), EntityHandle::new(id, 0), ObjectCategory(0))
    }

    fn single_cell_db(capacity: u32, grow_factor: f32) -> UniformSpatialDatabase {
        let grid = UniformGrid::new(1.0, IVec3::ONE, grow_factor).unwrap();
        UniformSpatialDatabase::initialize(grid, capacity).unwrap()
    }

    #[test]
    fn test_initialize_lays_out_even_windows() {
        let grid = UniformGrid::new(1.0, IVec3::new(3, 2, 4), 2.0).unwrap();
        let db = UniformSpatialDatabase::initialize(grid, 5).unwrap();

        assert_eq!(db.cells().len(), 24);
        assert_eq!(db.total_capacity(), 24 * 5);
        for (i, cell) in db.cells().iter().enumerate() {
            assert_eq!(cell.start, i as u32 * 5);
            assert_eq!(cell.capacity, 5);
            assert_eq!(cell.length, 0);
            assert_eq!(cell.excess, 0);
        }
    }

    #[test]
    fn test_initialize_rejects_offset_overflow() {
        let grid = UniformGrid::new(1.0, IVec3::splat(1024), 1.0).unwrap();
        let result = UniformSpatialDatabase::initialize(grid, 8192);
        assert!(matches!(result, Err(SpatialError::CapacityOverflow(_))));
    }

    #[test]
    fn test_add_stores_into_cell_window() {
        let grid = UniformGrid::new(2.0, IVec3::new(2, 1, 2), 2.0).unwrap();
        let mut db = UniformSpatialDatabase::initialize(grid, 4).unwrap();

        let a = db.add(element(-1.0, 0.0, -1.0, 1));
        let b = db.add(element(1.0, 0.0, 1.0, 2));
        let c = db.add(element(5.0, 0.0, 5.0, 3));

        assert_eq!(a, InsertOutcome::Stored { cell_index: 0 });
        assert_eq!(b, InsertOutcome::Stored { cell_index: 3 });
        assert_eq!(c, InsertOutcome::OutOfBounds);
        assert_eq!(db.stored_count(), 2);
        assert_eq!(db.elements_in_cell(0)[0].entity, EntityHandle::new(1, 0));
        assert_eq!(db.elements_in_cell(3)[0].entity, EntityHandle::new(2, 0));
        assert!(db.elements_in_cell(1).is_empty());
        assert!(db.elements_in_cell(99).is_empty());
    }

    #[test]
    fn test_overflow_counts_excess() {
        let mut db = single_cell_db(2, 2.0);

        assert!(db.add(element(0.1, 0.1, 0.1, 1)).is_stored());
        assert!(db.add(element(0.2, 0.2, 0.2, 2)).is_stored());
        assert_eq!(
            db.add(element(0.3, 0.3, 0.3, 3)),
            InsertOutcome::Overflow { cell_index: 0 }
        );

        let cell = db.cell(0).unwrap();
        assert_eq!(cell.length, 2);
        assert_eq!(cell.excess, 1);

        db.clear_and_resize().unwrap();
        let cell = db.cell(0).unwrap();
        assert_eq!(cell.capacity, 6);
        assert_eq!(cell.length, 0);
        assert_eq!(cell.excess, 0);
        assert_eq!(db.total_capacity(), 6);
    }

    #[test]
    fn test_grown_cells_repack_contiguously() {
        let grid = UniformGrid::new(1.0, IVec3::new(3, 1, 1), 1.5).unwrap();
        let mut db = UniformSpatialDatabase::initialize(grid, 2).unwrap();

        // Middle cell (x in [-0.5, 0.5)) gets 5 inserts: 2 stored, 3 excess
        for i in 0..5 {
            db.add(element(0.0, 0.0, 0.0, i));
        }
        db.clear_and_resize().unwrap();

        let cells = db.cells();
        assert_eq!(cells[0].start, 0);
        assert_eq!(cells[0].capacity, 2);
        assert_eq!(cells[1].start, 2);
        // ceil((2 + 3) * 1.5) = 8
        assert_eq!(cells[1].capacity, 8);
        assert_eq!(cells[2].start, 10);
        assert_eq!(cells[2].capacity, 2);
        assert_eq!(db.total_capacity(), 12);
    }

    #[test]
    fn test_clear_and_resize_is_idempotent_without_adds() {
        let grid = UniformGrid::new(1.0, IVec3::new(2, 2, 2), 2.0).unwrap();
        let mut db = UniformSpatialDatabase::initialize(grid, 3).unwrap();
        let before: Vec<u32> = db.cells().iter().map(|c| c.capacity).collect();

        db.clear_and_resize().unwrap();
        db.clear_and_resize().unwrap();

        let after: Vec<u32> = db.cells().iter().map(|c| c.capacity).collect();
        assert_eq!(before, after);
        assert!(db.cells().iter().all(|c| c.length == 0));
    }

    #[test]
    fn test_clear_discards_previous_elements() {
        let mut db = single_cell_db(4, 1.0);
        db.add(element(0.1, 0.1, 0.1, 7));
        db.clear_and_resize().unwrap();

        assert_eq!(db.stored_count(), 0);
        assert!(db
            .elements()
            .iter()
            .all(|e| *e == SpatialElement::default()));
    }

    #[test]
    fn test_light_clear_keeps_excess() {
        let mut db = single_cell_db(1, 2.0);
        db.add(element(0.1, 0.1, 0.1, 1));
        db.add(element(0.1, 0.1, 0.1, 2));

        db.clear();
        let cell = db.cell(0).unwrap();
        assert_eq!(cell.length, 0);
        assert_eq!(cell.excess, 1);
        assert_eq!(cell.capacity, 1);
    }

    #[test]
    fn test_rebuild_reports_outcomes() {
        let mut db = single_cell_db(2, 2.0);
        let batch = vec![
            element(0.1, 0.1, 0.1, 1),
            element(0.2, 0.2, 0.2, 2),
            element(0.3, 0.3, 0.3, 3),
            element(9.0, 0.0, 0.0, 4),
        ];

        let stats = db.rebuild(batch.clone()).unwrap();
        assert_eq!(
            stats,
            RebuildStats {
                stored: 2,
                out_of_bounds: 1,
                overflowed: 1,
                total_capacity: 2,
            }
        );

        // Next tick the cell has grown to ceil(3 * 2) = 6 and absorbs the batch
        let stats = db.rebuild(batch).unwrap();
        assert_eq!(stats.stored, 3);
        assert_eq!(stats.overflowed, 0);
        assert_eq!(stats.total_capacity, 6);
    }

    #[test]
    fn test_stats() {
        let grid = UniformGrid::new(1.0, IVec3::new(2, 1, 1), 1.0).unwrap();
        let mut db = UniformSpatialDatabase::initialize(grid, 2).unwrap();
        for i in 0..3 {
            db.add(element(-0.5, 0.0, 0.0, i));
        }

        let stats = db.stats();
        assert_eq!(stats.cell_count, 2);
        assert_eq!(stats.total_capacity, 4);
        assert_eq!(stats.stored_elements, 2);
        assert_eq!(stats.excess_elements, 1);
        assert_eq!(stats.occupied_cells, 1);
        assert_eq!(stats.max_cell_length, 2);
    }

    #[test]
    fn test_zero_capacity_cells_grow_after_overflow() {
        let mut db = single_cell_db(0, 1.0);
        assert_eq!(
            db.add(element(0.0, 0.0, 0.0, 1)),
            InsertOutcome::Overflow { cell_index: 0 }
        );
        db.clear_and_resize().unwrap();
        assert_eq!(db.cell(0).unwrap().capacity, 1);
    }

    #[test]
    fn test_capacity_overflow_leaves_database_untouched() {
        let grid = UniformGrid::new(1.0, IVec3::ONE, 2.0).unwrap();
        let mut db = UniformSpatialDatabase {
            grid,
            cells: vec![SpatialCell {
                start: 0,
                capacity: u32::MAX - 1,
                length: 0,
                excess: 5,
            }],
            elements: vec![element(0.0, 0.0, 0.0, 7); 3],
        };
        let cells_before = db.cells.clone();
        let elements_before = db.elements.clone();

        assert!(matches!(
            db.clear_and_resize(),
            Err(SpatialError::CapacityOverflow(_))
        ));
        assert_eq!(db.cells, cells_before);
        assert_eq!(db.elements, elements_before);
    }

    #[test]
    fn test_huge_grow_factor_overflows_instead_of_saturating() {
        let mut db = single_cell_db(1, 1.0e10);
        db.add(element(0.0, 0.0, 0.0, 1));
        db.add(element(0.0, 0.0, 0.0, 2));
        assert_eq!(db.cell(0).unwrap().excess, 1);

        let err = db.clear_and_resize().unwrap_err();
        assert!(matches!(err, SpatialError::CapacityOverflow(_)));
        assert_eq!(db.cell(0).unwrap().capacity, 1);
        assert_eq!(db.cell(0).unwrap().excess, 1);
        assert_eq!(db.elements_in_cell(0).len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_layout() {
        let mut db = single_cell_db(2, 2.0);
        db.add(element(0.1, 0.1, 0.1, 4));

        let json = serde_json::to_string(&db).unwrap();
        let restored: UniformSpatialDatabase = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cells(), db.cells());
        assert_eq!(restored.elements_in_cell(0), db.elements_in_cell(0));
    }

    fn snapshot_value() -> serde_json::Value {
        let grid = UniformGrid::new(1.0, IVec3::new(2, 1, 1), 2.0).unwrap();
        let mut db = UniformSpatialDatabase::initialize(grid, 2).unwrap();
        db.add(element(-0.5, 0.0, 0.0, 1));
        serde_json::to_value(&db).unwrap()
    }

    fn assert_rejected(value: serde_json::Value) {
        let err = serde_json::from_value::<UniformSpatialDatabase>(value).unwrap_err();
        assert!(err.to_string().contains("Invalid"), "{err}");
    }

    #[test]
    fn test_snapshot_with_missing_cells_is_rejected() {
        let mut value = snapshot_value();
        value["cells"].as_array_mut().unwrap().pop();
        assert_rejected(value);
    }

    #[test]
    fn test_snapshot_with_short_element_buffer_is_rejected() {
        let mut value = snapshot_value();
        value["elements"].as_array_mut().unwrap().truncate(1);
        assert_rejected(value);
    }

    #[test]
    fn test_snapshot_with_overfull_or_gapped_window_is_rejected() {
        let mut overfull = snapshot_value();
        overfull["cells"][0]["length"] = serde_json::json!(3);
        assert_rejected(overfull);

        let mut gapped = snapshot_value();
        gapped["cells"][1]["start"] = serde_json::json!(3);
        assert_rejected(gapped);
    }

    #[test]
    fn test_snapshot_with_invalid_grid_is_rejected() {
        let mut value = snapshot_value();
        value["grid"]["grow_factor"] = serde_json::json!(0.5);
        assert_rejected(value);
    }
}
