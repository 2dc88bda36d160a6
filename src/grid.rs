//! Grid localization.
//!
//! The monitored floor is a regular `rows x cols` partition of the projected
//! camera image. A detected box is located by projecting it to pixels, taking
//! its center and picking the nearest cell centroid.
//!
//! Centroids are stored in row-major order. Index `i` always decodes to row
//! `i / cols`, column `i % cols`; `nearest_index` relies on it for tie-breaks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bbox::{NormalizedBox, PixelBox};
use crate::error::LocateError;

/// Upper bound on `rows * cols`. Centroids are held in memory and scanned per call.
pub const MAX_GRID_CELLS: usize = 1 << 16;

/// Geometry of the floor grid as seen in the cropped camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Cell width in pixels.
    pub cell_width: f64,
    /// Cell height in pixels.
    pub cell_height: f64,
    pub rows: usize,
    pub cols: usize,
    /// Width of the projected image the boxes are normalized against.
    pub image_width: u32,
    /// Height of the projected image the boxes are normalized against.
    pub image_height: u32,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            cell_width: 120.0,
            cell_height: 145.0,
            rows: 4,
            cols: 5,
            image_width: 610,
            image_height: 590,
        }
    }
}

impl GridGeometry {
    /// Number of cells. Saturates for geometries that `GridLocalizer::new`
    /// would reject.
    pub fn cell_count(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    fn validate(&self) -> Result<(), LocateError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(LocateError::InvalidGeometry(format!(
                "grid must have at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }
        match self.rows.checked_mul(self.cols) {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => {
                return Err(LocateError::InvalidGeometry(format!(
                    "grid of {}x{} cells exceeds the limit of {} cells",
                    self.rows, self.cols, MAX_GRID_CELLS
                )))
            }
        }
        for (name, value) in [
            ("cell_width", self.cell_width),
            ("cell_height", self.cell_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(LocateError::InvalidGeometry(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(LocateError::InvalidGeometry(format!(
                "projected image must be non-empty, got {}x{}",
                self.image_width, self.image_height
            )));
        }
        Ok(())
    }
}

/// Pixel-space center of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GridCentroid {
    pub x: f64,
    pub y: f64,
}

impl GridCentroid {
    fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

/// 1-indexed grid cell, displayed as `(row,col)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct GridCoordinate {
    pub row: usize,
    pub col: usize,
}

impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Nearest-centroid classifier over a fixed grid.
///
/// Immutable after construction; share it behind an `Arc` across threads.
#[derive(Clone, Debug)]
pub struct GridLocalizer {
    geometry: GridGeometry,
    centroids: Vec<GridCentroid>,
}

impl GridLocalizer {
    pub fn new(geometry: GridGeometry) -> Result<Self, LocateError> {
        geometry.validate()?;
        let half_w = geometry.cell_width / 2.0;
        let half_h = geometry.cell_height / 2.0;
        let centroids = (0..geometry.rows)
            .flat_map(|row| (0..geometry.cols).map(move |col| (row, col)))
            .map(|(row, col)| GridCentroid {
                x: col as f64 * geometry.cell_width + half_w,
                y: row as f64 * geometry.cell_height + half_h,
            })
            .collect();
        Ok(Self {
            geometry,
            centroids,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// All cell centroids in row-major order.
    pub fn centroids(&self) -> &[GridCentroid] {
        &self.centroids
    }

    /// Centroid of a 1-indexed cell, if it exists.
    pub fn centroid(&self, cell: GridCoordinate) -> Option<GridCentroid> {
        if cell.row == 0
            || cell.col == 0
            || cell.row > self.geometry.rows
            || cell.col > self.geometry.cols
        {
            return None;
        }
        let index = (cell.row - 1) * self.geometry.cols + (cell.col - 1);
        self.centroids.get(index).copied()
    }

    /// Decode a row-major centroid index into a 1-indexed coordinate.
    pub fn cell_at(&self, index: usize) -> GridCoordinate {
        GridCoordinate {
            row: index / self.geometry.cols + 1,
            col: index % self.geometry.cols + 1,
        }
    }

    /// Project a normalized box into pixels.
    ///
    /// Each coordinate becomes `max(0, min(v * dim, dim))`, truncated to an
    /// integer. Out-of-range values are clamped, not rejected.
    pub fn normalize(&self, bbox: NormalizedBox) -> Result<PixelBox, LocateError> {
        if !bbox.is_finite() {
            return Err(LocateError::InvalidBoundingBox(format!(
                "non-finite coordinates {:?}",
                bbox.to_array()
            )));
        }
        let width = self.geometry.image_width;
        let height = self.geometry.image_height;
        Ok(PixelBox {
            xmin: project(bbox.xmin, width),
            ymin: project(bbox.ymin, height),
            xmax: project(bbox.xmax, width),
            ymax: project(bbox.ymax, height),
        })
    }

    /// Locate a pixel box on the grid. Coordinates past the projected image
    /// are clamped to its edges first.
    pub fn locate(&self, bbox: PixelBox) -> Result<GridCoordinate, LocateError> {
        let bbox = bbox.clamped(self.geometry.image_width, self.geometry.image_height);
        if bbox.is_inverted() {
            return Err(LocateError::InvalidBoundingBox(format!(
                "inverted range {:?}",
                bbox.to_array()
            )));
        }
        let (cx, cy) = bbox.centroid();
        let index = self.nearest_index(cx, cy);
        let cell = self.cell_at(index);
        log::debug!(
            "box {:?} centroid ({}, {}) -> cell index {} {}",
            bbox.to_array(),
            cx,
            cy,
            index,
            cell
        );
        Ok(cell)
    }

    /// `normalize` followed by `locate`.
    pub fn locate_normalized(&self, bbox: NormalizedBox) -> Result<GridCoordinate, LocateError> {
        let pixels = self.normalize(bbox)?;
        self.locate(pixels)
    }

    /// Index of the centroid nearest to `(x, y)`. Exact ties keep the lowest index.
    pub fn nearest_index(&self, x: f64, y: f64) -> usize {
        let mut best_index = 0;
        let mut best_distance = f64::INFINITY;
        for (index, centroid) in self.centroids.iter().enumerate() {
            let distance = centroid.distance_to(x, y);
            if distance < best_distance {
                best_distance = distance;
                best_index = index;
            }
        }
        best_index
    }
}

fn project(value: f64, dimension: u32) -> u32 {
    let dim = dimension as f64;
    (value * dim).min(dim).max(0.0) as u32
}
