//! Synthetic grid town written in the binary map format.
//!
//! `size × size` intersections on a 100 m lattice around a fixed anchor.
//! Rows are "Nth St", columns "Nth Ave".  The middle row and column are
//! primary roads so their crossings get signals; the rest are local.  A
//! footpath cuts diagonally across the first block and is dropped at load.

use std::path::Path;

use anyhow::Result;

use st_core::{GeoBounds, GeoPoint};
use st_spatial::format::{write_segments, write_shapes, write_streets, SegmentRecord, StreetRecord};
use st_spatial::{MapFiles, RoadClass};

/// Anchor of the south-west corner.
const ANCHOR_LAT: f64 = 40.0;
const ANCHOR_LON: f64 = -75.0;
const BLOCK_M:    f64 = 100.0;
const M_PER_DEG:  f64 = 111_320.0;

pub struct GridTown {
    pub files:    MapFiles,
    pub region:   GeoBounds,
    /// Records written, footpath included.
    pub segments: usize,
}

fn point(col: usize, row: usize) -> GeoPoint {
    let lat = ANCHOR_LAT + row as f64 * BLOCK_M / M_PER_DEG;
    let lon = ANCHOR_LON + col as f64 * BLOCK_M / (M_PER_DEG * ANCHOR_LAT.to_radians().cos());
    GeoPoint::new(lat, lon)
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Write the three map files for a `size × size` grid into `dir`.
pub fn write_grid_town(dir: &Path, size: usize) -> Result<GridTown> {
    anyhow::ensure!(size >= 2, "grid needs at least 2 × 2 intersections, got {size}");
    let middle = size / 2;

    // Streets 0..size are rows, size..2·size are columns.
    let mut streets = Vec::with_capacity(2 * size);
    for row in 0..size {
        streets.push(StreetRecord::new("", &ordinal(row + 1), "St", ""));
    }
    for col in 0..size {
        streets.push(StreetRecord::new("", &ordinal(col + 1), "Ave", ""));
    }

    let mut segments = Vec::new();
    for row in 0..size {
        let class = if row == middle { RoadClass::Primary } else { RoadClass::Local };
        for col in 0..size - 1 {
            segments.push(SegmentRecord::new(point(col, row), point(col + 1, row), class).with_street(row as u32));
        }
    }
    for col in 0..size {
        let class = if col == middle { RoadClass::Primary } else { RoadClass::Local };
        for row in 0..size - 1 {
            segments.push(
                SegmentRecord::new(point(col, row), point(col, row + 1), class).with_street((size + col) as u32),
            );
        }
    }

    segments.push(SegmentRecord::new(point(0, 0), point(1, 1), RoadClass::Trail));

    let files = MapFiles::in_dir(dir);
    write_segments(&files.segments, &segments)?;
    write_streets(&files.streets, &streets)?;
    write_shapes(&files.shapes, &[])?;

    // Pad the region by half a block so edge segments are not clipped.
    let lo = point(0, 0);
    let hi = point(size - 1, size - 1);
    let pad = 0.5 * BLOCK_M / M_PER_DEG;
    let region = GeoBounds::new(lo.lat - pad, hi.lat + pad, lo.lon - 2.0 * pad, hi.lon + 2.0 * pad)?;

    Ok(GridTown { files, region, segments: segments.len() })
}
