// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Stock query collectors.

Queries visit whole cells, so collectors that care about the exact query box
filter elements by position themselves.
*/

use glam::Vec3;

use crate::query::SpatialQueryCollector;
use crate::types::{ObjectCategory, SpatialCell, SpatialElement};

/// Category predicate shared by the collectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    Any,
    Only(ObjectCategory),
    Except(ObjectCategory),
}

impl CategoryFilter {
    #[inline]
    pub fn accepts(&self, category: ObjectCategory) -> bool {
        match self {
            CategoryFilter::Any => true,
            CategoryFilter::Only(wanted) => category == *wanted,
            CategoryFilter::Except(rejected) => category != *rejected,
        }
    }
}

#[inline]
fn inside_box(position: Vec3, min: Vec3, max: Vec3) -> bool {
    position.cmpge(min).all() && position.cmple(max).all()
}

/// Gathers every element inside the query box
#[derive(Debug, Clone)]
pub struct CollectAll {
    min: Vec3,
    max: Vec3,
    filter: CategoryFilter,
    pub results: Vec<SpatialElement>,
}

impl CollectAll {
    pub fn new(center: Vec3, half_extents: Vec3, filter: CategoryFilter) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
            filter,
            results: Vec::new(),
        }
    }

    /// Reuse the result buffer for another query
    pub fn reset(&mut self, center: Vec3, half_extents: Vec3) {
        self.min = center - half_extents;
        self.max = center + half_extents;
        self.results.clear();
    }
}

impl SpatialQueryCollector for CollectAll {
    #[inline]
    fn on_visit(&mut self, _cell: &SpatialCell, elements: &[SpatialElement]) -> bool {
        let (filter, min, max) = (self.filter, self.min, self.max);
        self.results.extend(elements.iter().filter(|element| {
            filter.accepts(element.category) && inside_box(element.position, min, max)
        }));
        false
    }
}

/// Stops at the first element inside the query box.
///
/// Paired with the proximity-ordered query this returns an element from the
/// nearest occupied shell, not necessarily the closest element.
#[derive(Debug, Clone)]
pub struct FirstMatch {
    min: Vec3,
    max: Vec3,
    filter: CategoryFilter,
    pub found: Option<SpatialElement>,
}

impl FirstMatch {
    pub fn new(center: Vec3, half_extents: Vec3, filter: CategoryFilter) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
            filter,
            found: None,
        }
    }
}

impl SpatialQueryCollector for FirstMatch {
    #[inline]
    fn on_visit(&mut self, _cell: &SpatialCell, elements: &[SpatialElement]) -> bool {
        let (filter, min, max) = (self.filter, self.min, self.max);
        self.found = elements.iter().copied().find(|element| {
            filter.accepts(element.category) && inside_box(element.position, min, max)
        });
        self.found.is_some()
    }
}

/// Tracks the element closest to a point
///
/// Never stops a query early. A collector only sees cell windows, not their
/// position, so it cannot bound the distance of cells not yet visited, and an
/// element in an outer shell can be closer than one in the source cell. Both
/// sweeps therefore visit the whole range and return the same distance; pair
/// it with [`query_aabb`](crate::UniformSpatialDatabase::query_aabb) and a box
/// sized to the search radius. On exact distance ties the first element
/// visited wins, which depends on the sweep order.
#[derive(Debug, Clone)]
pub struct NearestMatch {
    point: Vec3,
    max_distance_sq: f32,
    filter: CategoryFilter,
    best: Option<(SpatialElement, f32)>,
}

impl NearestMatch {
    pub fn new(point: Vec3, filter: CategoryFilter) -> Self {
        Self {
            point,
            max_distance_sq: f32::INFINITY,
            filter,
            best: None,
        }
    }

    /// Ignore elements farther than `max_distance` from the point
    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance_sq = max_distance * max_distance;
        self
    }

    pub fn nearest(&self) -> Option<SpatialElement> {
        self.best.map(|(element, _)| element)
    }

    pub fn nearest_distance(&self) -> Option<f32> {
        self.best.map(|(_, distance_sq)| distance_sq.sqrt())
    }
}

impl SpatialQueryCollector for NearestMatch {
    #[inline]
    fn on_visit(&mut self, _cell: &SpatialCell, elements: &[SpatialElement]) -> bool {
        for element in elements {
            if !self.filter.accepts(element.category) {
                continue;
            }
            let distance_sq = element.position.distance_squared(self.point);
            if distance_sq > self.max_distance_sq {
                continue;
            }
            match self.best {
                Some((_, best_sq)) if best_sq <= distance_sq => {}
                _ => self.best = Some((*element, distance_sq)),
            }
        }
        false
    }
}

/// Counts visited cells and the elements they hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellCounter {
    pub cells: usize,
    pub elements: usize,
    pub overflowed_cells: usize,
}

impl SpatialQueryCollector for CellCounter {
    #[inline]
    fn on_visit(&mut self, cell: &SpatialCell, elements: &[SpatialElement]) -> bool {
        self.cells += 1;
        self.elements += elements.len();
        if cell.excess > 0 {
            self.overflowed_cells += 1;
        }
        false
    }
}
