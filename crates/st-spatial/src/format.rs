//! On-disk map record layouts.
//!
//! Three little-endian files describe a map:
//!
//! | File      | Layout                                                                 |
//! |-----------|------------------------------------------------------------------------|
//! | segments  | packed 44-byte [`SegmentRecord`]s, no header                           |
//! | streets   | packed 38-byte [`StreetRecord`]s, addressed by street index            |
//! | shapes    | `i32` record count, then per record an `i32` point count and that many `(lon, lat)` `i32` pairs |
//!
//! Coordinates are integer micro-degrees.  Records are decoded with
//! `bytemuck::pod_read_unaligned` so file buffers need no alignment, and
//! every integer field is passed through `from_le`/`to_le`.
//!
//! The writers exist for fixtures and for synthesizing maps in the demo.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};

use st_core::{GeoPoint, ShapeId, StreetId};

use crate::error::io_err;
use crate::network::RoadClass;
use crate::SpatialResult;

// ── Segment records ───────────────────────────────────────────────────────────

/// One road segment as stored in the segment file.
///
/// The four adjacency fields are carried through for fidelity but unused:
/// connectivity is rebuilt by merging endpoints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SegmentRecord {
    pub adjacency:  [i32; 4],
    /// Street-name record index, `-1` for none.
    pub street:     i32,
    /// Shape record index, `-1` for none.
    pub shape:      i32,
    pub start_lon:  i32,
    pub start_lat:  i32,
    pub end_lon:    i32,
    pub end_lat:    i32,
    pub road_class: u8,
    pub padding:    [u8; 3],
}

pub const SEGMENT_RECORD_LEN: usize = 44;
const _: () = assert!(std::mem::size_of::<SegmentRecord>() == SEGMENT_RECORD_LEN);

impl SegmentRecord {
    /// A record with no street, no shape and no adjacency.
    pub fn new(start: GeoPoint, end: GeoPoint, class: RoadClass) -> Self {
        let (start_lat, start_lon) = start.to_micro();
        let (end_lat, end_lon) = end.to_micro();
        Self {
            adjacency: [-1; 4],
            street: -1,
            shape: -1,
            start_lon,
            start_lat,
            end_lon,
            end_lat,
            road_class: class.code(),
            padding: [0; 3],
        }
    }

    pub fn with_street(mut self, index: u32) -> Self {
        self.street = index as i32;
        self
    }

    pub fn with_shape(mut self, index: u32) -> Self {
        self.shape = index as i32;
        self
    }

    /// Decode one record from exactly [`SEGMENT_RECORD_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Self {
        let raw: SegmentRecord = bytemuck::pod_read_unaligned(bytes);
        raw.swap_le()
    }

    /// Append the little-endian encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::bytes_of(&self.swap_le()));
    }

    /// Convert every integer field between host and little-endian order.
    /// The conversion is its own inverse.
    fn swap_le(self) -> Self {
        Self {
            adjacency: self.adjacency.map(i32::from_le),
            street: i32::from_le(self.street),
            shape: i32::from_le(self.shape),
            start_lon: i32::from_le(self.start_lon),
            start_lat: i32::from_le(self.start_lat),
            end_lon: i32::from_le(self.end_lon),
            end_lat: i32::from_le(self.end_lat),
            ..self
        }
    }

    #[inline]
    pub fn start(&self) -> GeoPoint {
        GeoPoint::from_micro(self.start_lat, self.start_lon)
    }

    #[inline]
    pub fn end(&self) -> GeoPoint {
        GeoPoint::from_micro(self.end_lat, self.end_lon)
    }

    #[inline]
    pub fn street_id(&self) -> Option<StreetId> {
        (self.street >= 0).then(|| StreetId(self.street as u32))
    }

    #[inline]
    pub fn shape_id(&self) -> Option<ShapeId> {
        (self.shape >= 0).then(|| ShapeId(self.shape as u32))
    }

    /// `None` for unknown class codes.
    #[inline]
    pub fn class(&self) -> Option<RoadClass> {
        RoadClass::from_code(self.road_class)
    }
}

// ── Street records ────────────────────────────────────────────────────────────

/// Fixed-width street name fields, space or NUL padded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StreetRecord {
    pub prefix: [u8; 2],
    pub name:   [u8; 30],
    pub suffix: [u8; 4],
    pub kind:   [u8; 2],
}

pub const STREET_RECORD_LEN: usize = 38;
const _: () = assert!(std::mem::size_of::<StreetRecord>() == STREET_RECORD_LEN);

fn pack<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [b' '; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn unpack(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

impl StreetRecord {
    /// Fields longer than their slot are truncated.
    pub fn new(prefix: &str, name: &str, kind: &str, suffix: &str) -> Self {
        Self { prefix: pack(prefix), name: pack(name), suffix: pack(suffix), kind: pack(kind) }
    }

    pub fn decode(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    pub fn to_name(&self) -> crate::StreetName {
        crate::StreetName {
            prefix: unpack(&self.prefix),
            name:   unpack(&self.name),
            suffix: unpack(&self.suffix),
            kind:   unpack(&self.kind),
        }
    }
}

// ── Writers ───────────────────────────────────────────────────────────────────

pub fn write_segments(path: &Path, records: &[SegmentRecord]) -> SpatialResult<()> {
    let mut buf = Vec::with_capacity(records.len() * SEGMENT_RECORD_LEN);
    for r in records {
        r.encode_into(&mut buf);
    }
    write_all(path, &buf)
}

pub fn write_streets(path: &Path, records: &[StreetRecord]) -> SpatialResult<()> {
    write_all(path, bytemuck::cast_slice(records))
}

/// Shape `i` of the file is `shapes[i]`.
pub fn write_shapes(path: &Path, shapes: &[Vec<GeoPoint>]) -> SpatialResult<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(shapes.len() as i32).to_le_bytes());
    for shape in shapes {
        buf.extend_from_slice(&(shape.len() as i32).to_le_bytes());
        for p in shape {
            let (lat, lon) = p.to_micro();
            buf.extend_from_slice(&lon.to_le_bytes());
            buf.extend_from_slice(&lat.to_le_bytes());
        }
    }
    write_all(path, &buf)
}

fn write_all(path: &Path, bytes: &[u8]) -> SpatialResult<()> {
    let file = File::create(path).map_err(io_err(path))?;
    let mut w = BufWriter::new(file);
    w.write_all(bytes).map_err(io_err(path))?;
    w.flush().map_err(io_err(path))
}
