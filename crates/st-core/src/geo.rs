//! Geographic and planar geometry.
//!
//! Map files store coordinates as integer micro-degrees.  The engine works in
//! a local planar frame measured in metres: X grows eastward, Y grows
//! *downward* (southward) from the top-left corner of the loaded region.
//! [`Projection`] converts between the two using a flat-earth approximation
//! that is accurate to well under 0.5 % over city-sized regions.

use std::ops::{Add, Mul, Sub};

use crate::{CoreError, CoreResult};

/// Metres per degree of latitude (WGS-84 equatorial circumference / 360).
pub const METERS_PER_DEGREE_LAT: f64 = 111_319.49;

// ── GeoPoint ──────────────────────────────────────────────────────────────────

/// A WGS-84 geographic coordinate in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build from the integer micro-degree encoding used by the map files.
    #[inline]
    pub fn from_micro(lat: i32, lon: i32) -> Self {
        Self { lat: lat as f64 / 1e6, lon: lon as f64 / 1e6 }
    }

    /// Round to the integer micro-degree encoding used by the map files.
    #[inline]
    pub fn to_micro(self) -> (i32, i32) {
        ((self.lat * 1e6).round() as i32, (self.lon * 1e6).round() as i32)
    }

    /// Haversine great-circle distance in metres.
    pub fn distance_m(self, other: GeoPoint) -> f64 {
        const R: f64 = 6_371_000.0; // mean Earth radius, metres

        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat * 0.5).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);
        R * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

// ── GeoBounds ─────────────────────────────────────────────────────────────────

/// A latitude/longitude bounding box, inclusive on all sides.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    /// Validated constructor.  A box with `min > max` on either axis is
    /// rejected with [`CoreError::InvalidRegion`].
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> CoreResult<Self> {
        let b = Self { min_lat, max_lat, min_lon, max_lon };
        b.validate()?;
        Ok(b)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let finite = [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(CoreError::InvalidRegion(format!(
                "lat [{}, {}] lon [{}, {}]",
                self.min_lat, self.max_lat, self.min_lon, self.max_lon
            )));
        }
        Ok(())
    }

    /// An "empty" box that any `include` call will replace.
    pub fn inverted() -> Self {
        Self {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        }
    }

    /// Grow the box to contain `p`.
    pub fn include(&mut self, p: GeoPoint) {
        self.min_lat = self.min_lat.min(p.lat);
        self.max_lat = self.max_lat.max(p.lat);
        self.min_lon = self.min_lon.min(p.lon);
        self.max_lon = self.max_lon.max(p.lon);
    }

    #[inline]
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }

    #[inline]
    pub fn mean_lat(&self) -> f64 {
        0.5 * (self.min_lat + self.max_lat)
    }

    /// The north-west corner, which becomes the planar origin.
    #[inline]
    pub fn top_left(&self) -> GeoPoint {
        GeoPoint::new(self.max_lat, self.min_lon)
    }
}

// ── Point ─────────────────────────────────────────────────────────────────────

/// A planar position (or displacement) in metres.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (other - self).length()
    }

    #[inline]
    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Unit vector in the same direction, or `ZERO` for a zero vector.
    #[inline]
    pub fn normalized(self) -> Point {
        let len = self.length();
        if len > 0.0 { self * (1.0 / len) } else { Point::ZERO }
    }

    /// The vector rotated a quarter turn to the right of travel.  With Y
    /// pointing down, heading east `(1, 0)` gives south `(0, 1)`.
    #[inline]
    pub fn right_normal(self) -> Point {
        Point::new(-self.y, self.x)
    }

    #[inline]
    pub fn lerp(self, other: Point, t: f64) -> Point {
        self + (other - self) * t
    }
}

impl Add for Point {
    type Output = Point;
    #[inline]
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    #[inline]
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    #[inline]
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

// ── Rect ──────────────────────────────────────────────────────────────────────

/// Axis-aligned planar rectangle.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    #[inline]
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Smallest rectangle containing every point, or `None` for no points.
    pub fn bounding<I: IntoIterator<Item = Point>>(points: I) -> Option<Rect> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut r = Rect::new(first, first);
        for p in iter {
            r.min.x = r.min.x.min(p.x);
            r.min.y = r.min.y.min(p.y);
            r.max.x = r.max.x.max(p.x);
            r.max.y = r.max.y.max(p.y);
        }
        Some(r)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// `true` if the two rectangles share any point (edges included).
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Square box of half-size `r` around `p`.
    #[inline]
    pub fn around(p: Point, r: f64) -> Rect {
        Rect::new(Point::new(p.x - r, p.y - r), Point::new(p.x + r, p.y + r))
    }
}

// ── Projection ────────────────────────────────────────────────────────────────

/// Local equirectangular projection anchored at a top-left origin.
///
/// ```text
/// x = (lon - origin.lon) * meters_per_deg_lon
/// y = (origin.lat - lat) * METERS_PER_DEGREE_LAT
/// ```
///
/// `meters_per_deg_lon` is fixed from the mean latitude of the *requested*
/// region; re-anchoring only moves the origin.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Projection {
    pub origin: GeoPoint,
    pub meters_per_deg_lon: f64,
    pub meters_per_deg_lat: f64,
}

impl Projection {
    /// Projection for `region`, anchored at its top-left corner.
    pub fn for_region(region: &GeoBounds) -> Self {
        Self {
            origin: region.top_left(),
            meters_per_deg_lon: METERS_PER_DEGREE_LAT * region.mean_lat().to_radians().cos(),
            meters_per_deg_lat: METERS_PER_DEGREE_LAT,
        }
    }

    /// Same scale, new origin.
    pub fn anchored_at(self, origin: GeoPoint) -> Self {
        Self { origin, ..self }
    }

    #[inline]
    pub fn to_planar(&self, p: GeoPoint) -> Point {
        Point::new(
            (p.lon - self.origin.lon) * self.meters_per_deg_lon,
            (self.origin.lat - p.lat) * self.meters_per_deg_lat,
        )
    }

    #[inline]
    pub fn to_geo(&self, p: Point) -> GeoPoint {
        GeoPoint::new(
            self.origin.lat - p.y / self.meters_per_deg_lat,
            self.origin.lon + p.x / self.meters_per_deg_lon,
        )
    }
}

// ── Polyline helpers ──────────────────────────────────────────────────────────

/// Total length of an open polyline.
pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Point located `along` metres from the first vertex, plus the unit heading
/// of the leg it lies on.
///
/// `along` is clamped to `[0, length]`.  A distance that lands exactly on an
/// interior vertex returns that vertex with the heading of the leg that ends
/// there.  Zero-length legs are skipped.
pub fn polyline_point_at(points: &[Point], along: f64) -> (Point, Point) {
    let Some(&first) = points.first() else {
        return (Point::ZERO, Point::new(1.0, 0.0));
    };
    let mut left = along.max(0.0);
    let mut heading = Point::new(1.0, 0.0);
    let mut last = first;
    for w in points.windows(2) {
        let leg = w[1] - w[0];
        let len = leg.length();
        if len <= 0.0 {
            continue;
        }
        heading = leg * (1.0 / len);
        if left <= len {
            return (w[0] + heading * left, heading);
        }
        left -= len;
        last = w[1];
    }
    (last, heading)
}

/// Sample a quadratic Bézier curve into `samples + 1` points.
pub fn quadratic_bezier(start: Point, control: Point, end: Point, samples: usize) -> Vec<Point> {
    let samples = samples.max(1);
    (0..=samples)
        .map(|i| {
            let t = i as f64 / samples as f64;
            let a = start.lerp(control, t);
            let b = control.lerp(end, t);
            a.lerp(b, t)
        })
        .collect()
}
