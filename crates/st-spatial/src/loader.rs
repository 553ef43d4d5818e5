//! Binary map loader.
//!
//! # Pipeline
//!
//! 1. Read the whole segment file and keep records whose class is drivable,
//!    whose endpoints both lie inside the requested region, and whose
//!    endpoints differ.
//! 2. Load only the shape records referenced by kept segments, skipping the
//!    others without decoding.
//! 3. Load only the referenced street records, each by seeking to
//!    `index × 38`.
//! 4. Compute the observed extents of the kept geometry, re-anchor the
//!    projection at their top-left corner and hand everything to
//!    [`RoadNetworkBuilder`].
//!
//! The longitude scale always comes from the *requested* region's mean
//! latitude, so re-anchoring moves the origin without changing distances.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use st_core::{CoreError, GeoBounds, GeoPoint, Projection, ShapeId, StreetId, TrafficConfig};

use crate::error::io_err;
use crate::format::{SegmentRecord, StreetRecord, SEGMENT_RECORD_LEN, STREET_RECORD_LEN};
use crate::network::{RoadNetwork, RoadNetworkBuilder, SegmentSpec};
use crate::{SpatialError, SpatialResult};

/// Paths of the three map files.
#[derive(Clone, Debug)]
pub struct MapFiles {
    pub segments: PathBuf,
    pub streets:  PathBuf,
    pub shapes:   PathBuf,
}

impl MapFiles {
    /// `segments.bin`, `streets.bin` and `shapes.bin` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            segments: dir.join("segments.bin"),
            streets:  dir.join("streets.bin"),
            shapes:   dir.join("shapes.bin"),
        }
    }
}

/// Counters reported in the load summary.
#[derive(Default, Debug)]
struct LoadStats {
    records:        usize,
    excluded_class: usize,
    outside:        usize,
    zero_length:    usize,
    degenerate:     usize,
}

/// Load the part of the map inside `region`.
///
/// # Errors
///
/// - [`SpatialError::Io`] if any of the three files is missing or unreadable;
/// - [`SpatialError::Corrupt`] for truncated or malformed records;
/// - [`SpatialError::Core`] with `InvalidRegion` if `region` is degenerate
///   or no segment survives clipping, or with `Config` if `config` is invalid.
pub fn load_map(files: &MapFiles, region: GeoBounds, config: &TrafficConfig) -> SpatialResult<RoadNetwork> {
    region.validate()?;
    config.validate()?;

    // Open all three files up front so a missing one fails before any work.
    let raw = fs::read(&files.segments).map_err(io_err(&files.segments))?;
    let shape_file = File::open(&files.shapes).map_err(io_err(&files.shapes))?;
    let mut street_file = File::open(&files.streets).map_err(io_err(&files.streets))?;

    // ── Segments ──────────────────────────────────────────────────────────
    if raw.len() % SEGMENT_RECORD_LEN != 0 {
        return Err(SpatialError::Corrupt {
            file:   "segment",
            detail: format!("{} bytes is not a multiple of {SEGMENT_RECORD_LEN}", raw.len()),
        });
    }
    let mut stats = LoadStats::default();
    let mut kept: Vec<SegmentRecord> = Vec::new();
    for chunk in raw.chunks_exact(SEGMENT_RECORD_LEN) {
        stats.records += 1;
        let rec = SegmentRecord::decode(chunk);
        if !rec.class().is_some_and(|c| c.is_drivable()) {
            stats.excluded_class += 1;
            continue;
        }
        if !region.contains(rec.start()) || !region.contains(rec.end()) {
            stats.outside += 1;
            continue;
        }
        if (rec.start_lat, rec.start_lon) == (rec.end_lat, rec.end_lon) {
            stats.zero_length += 1;
            continue;
        }
        kept.push(rec);
    }
    if kept.is_empty() {
        return Err(CoreError::InvalidRegion(format!(
            "no drivable segment inside lat [{}, {}] lon [{}, {}]",
            region.min_lat, region.max_lat, region.min_lon, region.max_lon
        ))
        .into());
    }

    // ── Shapes and streets (sparse) ───────────────────────────────────────
    let wanted_shapes: BTreeSet<ShapeId> = kept.iter().filter_map(|r| r.shape_id()).collect();
    let shapes = read_shapes(&files.shapes, shape_file, &wanted_shapes)?;

    let wanted_streets: BTreeSet<StreetId> = kept.iter().filter_map(|r| r.street_id()).collect();
    let streets = read_streets(&files.streets, &mut street_file, &wanted_streets)?;

    // ── Frame ─────────────────────────────────────────────────────────────
    let mut observed = GeoBounds::inverted();
    for rec in &kept {
        observed.include(rec.start());
        observed.include(rec.end());
    }
    for points in shapes.values() {
        for &p in points {
            observed.include(p);
        }
    }
    observed.validate()?;
    let projection = Projection::for_region(&region).anchored_at(observed.top_left());
    debug!(
        "observed extents lat [{:.6}, {:.6}] lon [{:.6}, {:.6}]",
        observed.min_lat, observed.max_lat, observed.min_lon, observed.max_lon
    );

    // ── Build ─────────────────────────────────────────────────────────────
    let mut builder = RoadNetworkBuilder::from_config(config).projection(projection);
    for (id, points) in shapes {
        builder.add_shape(id, points.into_iter().map(|p| projection.to_planar(p)).collect());
    }
    for (id, name) in streets {
        builder.add_street(id, name);
    }
    for rec in &kept {
        let class = match rec.class() {
            Some(c) => c,
            None => continue,
        };
        let mut spec = SegmentSpec::new(projection.to_planar(rec.start()), projection.to_planar(rec.end())).class(class);
        spec.street = rec.street_id();
        spec.shape = rec.shape_id();
        match builder.add_segment(spec) {
            Ok(_) => {}
            Err(SpatialError::DegenerateSegment { .. }) => stats.degenerate += 1,
            Err(e) => return Err(e),
        }
    }
    if builder.segment_count() == 0 {
        return Err(CoreError::InvalidRegion("every kept segment is shorter than the tolerance".into()).into());
    }

    let network = builder.build();
    info!(
        "loaded {} of {} segments ({} excluded class, {} outside region, {} zero length, {} below tolerance); \
         {} intersections, {} streets, {} shapes",
        network.segment_count(),
        stats.records,
        stats.excluded_class,
        stats.outside,
        stats.zero_length,
        stats.degenerate,
        network.intersection_count(),
        network.streets.len(),
        network.shapes.len()
    );
    Ok(network)
}

// ── Sparse readers ────────────────────────────────────────────────────────────

/// Upper bound on points reserved up front for one shape record.
const MAX_SHAPE_PREALLOC: usize = 4_096;

fn corrupt_on_eof<'a>(file: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> SpatialError + 'a {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SpatialError::Corrupt { file, detail: "truncated record".into() }
        } else {
            io_err(path)(e)
        }
    }
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Decode only the shape records listed in `wanted`; others are skipped with
/// a relative seek.
fn read_shapes(path: &Path, file: File, wanted: &BTreeSet<ShapeId>) -> SpatialResult<FxHashMap<ShapeId, Vec<GeoPoint>>> {
    let mut out = FxHashMap::default();
    let Some(&last_wanted) = wanted.last() else {
        return Ok(out);
    };
    let len = file.metadata().map_err(io_err(path))?.len();
    let mut r = BufReader::new(file);
    let count = read_i32(&mut r).map_err(corrupt_on_eof("shape", path))?;
    if count < 0 {
        return Err(SpatialError::Corrupt { file: "shape", detail: format!("negative record count {count}") });
    }
    for index in 0..count as u32 {
        if index > last_wanted.0 {
            break;
        }
        let n = read_i32(&mut r).map_err(corrupt_on_eof("shape", path))?;
        if n < 0 {
            return Err(SpatialError::Corrupt { file: "shape", detail: format!("record {index} has {n} points") });
        }
        let pos = r.stream_position().map_err(io_err(path))?;
        if n as u64 * 8 > len.saturating_sub(pos) {
            return Err(SpatialError::Corrupt {
                file:   "shape",
                detail: format!("record {index} claims {n} points past the end of the file"),
            });
        }
        let id = ShapeId(index);
        if !wanted.contains(&id) {
            r.seek_relative(n as i64 * 8).map_err(io_err(path))?;
            continue;
        }
        let mut points = Vec::with_capacity((n as usize).min(MAX_SHAPE_PREALLOC));
        for _ in 0..n {
            let lon = read_i32(&mut r).map_err(corrupt_on_eof("shape", path))?;
            let lat = read_i32(&mut r).map_err(corrupt_on_eof("shape", path))?;
            points.push(GeoPoint::from_micro(lat, lon));
        }
        out.insert(id, points);
    }
    if out.len() < wanted.len() {
        warn!("{} referenced shapes missing from {}", wanted.len() - out.len(), path.display());
    }
    Ok(out)
}

/// Read the street records listed in `wanted` by direct seek.  An index past
/// the end of the file is reported and skipped.
fn read_streets(
    path: &Path,
    file: &mut File,
    wanted: &BTreeSet<StreetId>,
) -> SpatialResult<FxHashMap<StreetId, crate::StreetName>> {
    let len = file.metadata().map_err(io_err(path))?.len();
    let mut out = FxHashMap::default();
    let mut buf = [0u8; STREET_RECORD_LEN];
    for &id in wanted {
        let offset = id.0 as u64 * STREET_RECORD_LEN as u64;
        if offset + STREET_RECORD_LEN as u64 > len {
            warn!("street record {} is past the end of {}", id.0, path.display());
            continue;
        }
        file.seek(SeekFrom::Start(offset)).map_err(io_err(path))?;
        file.read_exact(&mut buf).map_err(corrupt_on_eof("street", path))?;
        out.insert(id, StreetRecord::decode(&buf).to_name());
    }
    Ok(out)
}
