// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core types for the uniform spatial database.

Cells and elements are plain `Copy` records so both buffers stay flat and
can be reallocated and zero-filled in one pass per tick.
*/

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Result type for spatial database operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Errors that can occur while building or rebuilding the spatial database
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Allocation failed: could not reserve {requested} {buffer} slots")]
    Allocation {
        buffer: &'static str,
        requested: usize,
    },

    #[error("Capacity overflow: {0}")]
    CapacityOverflow(String),

    #[error("Invalid cell layout: {0}")]
    InvalidLayout(String),
}

/// Non-owning handle back to the entity an element was created from.
///
/// The database never dereferences it; the generation lets the host detect
/// stale handles after the entity slot has been reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle {
    pub index: u32,
    pub generation: u32,
}

impl EntityHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Small tag used by collectors to filter elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectCategory(pub u8);

/// One indexed point. Recreated every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialElement {
    pub position: Vec3,
    pub entity: EntityHandle,
    pub category: ObjectCategory,
}

impl SpatialElement {
    pub fn new(position: Vec3, entity: EntityHandle, category: ObjectCategory) -> Self {
        Self {
            position,
            entity,
            category,
        }
    }
}

/// Bookkeeping for one grid cell: a window `[start, start + capacity)` into
/// the shared element buffer.
///
/// Invariant: `length <= capacity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialCell {
    /// Offset of the window in the element buffer
    pub start: u32,
    /// Window size
    pub capacity: u32,
    /// Elements stored this tick
    pub length: u32,
    /// Insertions rejected this tick because the window was full
    pub excess: u32,
}

impl SpatialCell {
    /// Range of occupied slots in the element buffer
    #[inline]
    pub fn occupied_range(&self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        start..start + self.length as usize
    }

    /// Range of the whole window in the element buffer
    #[inline]
    pub fn window_range(&self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        start..start + self.capacity as usize
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.length >= self.capacity
    }
}

/// What happened to an element passed to `add`.
///
/// None of these are errors: dropped elements are expected steady-state
/// behaviour and overflow feeds the next rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored in the cell with this index
    Stored { cell_index: usize },
    /// Position outside the grid bounds, not indexed
    OutOfBounds,
    /// Cell window full, counted in the cell's `excess`
    Overflow { cell_index: usize },
}

impl InsertOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, InsertOutcome::Stored { .. })
    }
}
